use std::{process, sync::Arc};

use kovert::{
    application::error::AppError,
    application::loader::CatalogLoader,
    cache::{CacheConfig, CacheRevalidator, CatalogCache, PageRevalidator},
    config,
    infra::{
        db::PostgresCatalogLoader,
        error::InfraError,
        http::{self, HttpState, PageCache, PageCacheRevalidator},
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (_cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    serve(settings).await
}

async fn serve(settings: config::Settings) -> Result<(), AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool =
        PostgresCatalogLoader::connect(database_url, settings.database.max_connections.get())
            .await
            .map_err(AppError::from)?;
    let loader: Arc<dyn CatalogLoader> = Arc::new(PostgresCatalogLoader::new(pool.clone()));

    let cache_config = CacheConfig::from(&settings.cache);
    let catalog = CatalogCache::new(loader, cache_config.ttl());
    let pages = Arc::new(PageCache::new(&cache_config));
    let page_revalidator: Arc<dyn PageRevalidator> =
        Arc::new(PageCacheRevalidator::new(pages.clone()));
    let revalidator = CacheRevalidator::new(catalog.clone(), page_revalidator, &cache_config);

    if settings.cache.warm_on_startup {
        match catalog.get(false).await {
            Ok(snapshot) => info!(
                items = snapshot.item_count(),
                categories = snapshot.category_count(),
                "catalog warmed on startup"
            ),
            Err(err) => warn!(error = %err, "startup catalog warmup failed"),
        }
    }

    let state = HttpState {
        catalog,
        revalidator,
        pages,
        db: Some(pool),
    };
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(addr = %settings.server.addr, "kovert listening");

    axum::serve(listener, router.into_make_service())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}

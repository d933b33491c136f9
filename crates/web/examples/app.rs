use async_trait::async_trait;
use http::StatusCode;
use serde_json::json;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;
use troika_web::{Application, HandlerResult, RedirectHandler, RequestContext, RequestHandler, Route, Settings};

struct Status;

// curl -v -H 'Accept: text/x-yaml' http://127.0.0.1:8000/status
#[async_trait]
impl RequestHandler for Status {
    async fn get(&self, ctx: &mut RequestContext<'_>) -> HandlerResult {
        let language = ctx.get_request_language().to_string();
        ctx.finish_with(json!({
            "status": "ok",
            "language": language,
            "server": ctx.settings().server_name,
        }))?;
        Ok(())
    }
}

struct Items;

// curl -v -H 'Content-Type: application/json' -d '{"name":"hello","zip":"world"}' http://127.0.0.1:8000/items/7
// curl -v -d 'name=hello&zip=world' http://127.0.0.1:8000/items/7
#[async_trait]
impl RequestHandler for Items {
    async fn post(&self, ctx: &mut RequestContext<'_>) -> HandlerResult {
        let id = ctx.path_kwarg("id").unwrap_or_default().to_string();
        let body = ctx.get_body_arguments()?.cloned();
        info!(id, ?body, "received item");
        ctx.set_status(StatusCode::NO_CONTENT, None);
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let settings = Settings {
        default_content_type: "application/json".to_string(),
        serve_traceback: true,
        compress_response: true,
        ..Settings::default()
    };

    let application = Application::builder()
        .route(Route::new("/status", Status).unwrap())
        .route(Route::new(r"/items/(?P<id>\d+)", Items).unwrap().name("items"))
        .route(Route::new("/google", RedirectHandler::new("https://www.google.com")).unwrap())
        .settings(settings)
        .build();

    let application = match application {
        Ok(application) => application,
        Err(e) => {
            error!(cause = %e, "invalid application");
            return;
        }
    };

    if let Err(e) = application.run().await {
        error!(cause = %e, "server stopped");
    }
}

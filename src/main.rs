use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use serde_json::{Value, json};
use tracing::{info, warn};

use loadsmith::args::LoadArgs;
use loadsmith::error::AppResult;
use loadsmith::http::HttpMethod;
use loadsmith::registry::ScreenFuture;
use loadsmith::{
    Access, Configuration, Context, Registry, Response, Runner, dashboard, logger, report,
    runner::print_summary,
};

fn main() -> Result<(), Box<dyn Error>> {
    let args = LoadArgs::parse();
    logger::init_logging(args.verbose);

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    if let Some(workers) = args.workers {
        builder.worker_threads(workers);
    }
    let runtime = builder.enable_all().build()?;

    runtime.block_on(async move {
        let registry = Arc::new(build_demo_registry(args.to_configuration()?)?);

        if args.web {
            dashboard::serve(registry, args.port).await?;
            return Ok(());
        }

        let runner =
            Runner::new(registry, &args.scenario)?.with_live_monitor(args.no_color);
        let summary = runner.run().await;
        print_summary(&summary);

        let document = runner.stats().report_document();
        match report::write_report(&document, Path::new(&args.report_dir)).await {
            Ok(path) => info!("results written to {}", path.display()),
            Err(err) => warn!("failed to write results file: {}", err),
        }
        Ok::<(), Box<dyn Error>>(())
    })
}

/// The built-in screen set: a browse/buy storefront flow exercising the
/// whole step-tree surface (store hand-off, auth headers, weighted splits).
/// Point `--base-url` at any HTTP service to smoke-test the harness.
fn build_demo_registry(config: Configuration) -> AppResult<Registry> {
    let mut registry = Registry::new(config);

    registry.add_screen("home", home);
    registry.add_screen("browse", browse);
    registry.add_screen("item", item);
    registry.add_screen("login", login);
    registry.add_screen("checkout", checkout);

    registry.add_scenario("main", |b| {
        b.visit("home").think(1.0..3.0).choose(|c| {
            c.percent(70, |b| {
                b.visit("browse").think(0.5..1.5).visit("item");
            });
            c.percent_scenario(30, "buy");
        });
    })?;
    registry.add_scenario("buy", |b| {
        b.visit("login")
            .visit("browse")
            .think(0.5..2.0)
            .visit("checkout");
    })?;

    Ok(registry)
}

fn home(ctx: &mut Context) -> ScreenFuture<'_> {
    Box::pin(async move {
        ctx.get("/").send().await;
        Ok(())
    })
}

fn browse(ctx: &mut Context) -> ScreenFuture<'_> {
    Box::pin(async move {
        let reply = ctx.get("/api/items").query("page", "1").send().await;
        if let Some(first_id) = reply
            .get("items")
            .and_then(Value::as_array)
            .and_then(|items| items.first())
            .and_then(|item| item.get("id"))
        {
            ctx.store_mut().insert("item_id".to_owned(), first_id.clone());
        }
        Ok(())
    })
}

fn item(ctx: &mut Context) -> ScreenFuture<'_> {
    Box::pin(async move {
        let item_id = ctx
            .store()
            .get("item_id")
            .and_then(Value::as_u64)
            .unwrap_or(1);
        ctx.get(format!("/api/items/{}", item_id))
            .name("/api/items/:id")
            .send()
            .await;
        Ok(())
    })
}

fn login(ctx: &mut Context) -> ScreenFuture<'_> {
    Box::pin(async move {
        let username = format!("user{}", ctx.user_id());
        let reply = ctx
            .post("/api/login")
            .json(json!({"username": username, "password": "secret"}))
            .send()
            .await;
        if let Some(token) = reply.get("token").and_then(Value::as_str) {
            let header = format!("Bearer {}", token);
            ctx.set_default_header("Authorization", header);
        }
        Ok(())
    })
}

fn checkout(ctx: &mut Context) -> ScreenFuture<'_> {
    Box::pin(async move {
        PlaceOrder::default().perform(ctx).await;
        Ok(())
    })
}

/// Order placement as a request template: json body from the stored item,
/// an `after` hook flagging rejected orders.
#[derive(Default)]
struct PlaceOrder;

#[async_trait]
impl Access for PlaceOrder {
    fn method(&self) -> HttpMethod {
        HttpMethod::Post
    }

    fn path(&self) -> String {
        "/api/orders".to_owned()
    }

    fn metric_name(&self) -> Option<String> {
        Some("/api/orders".to_owned())
    }

    fn request_json(&self, ctx: &Context) -> Option<Value> {
        let item_id = ctx.store().get("item_id").cloned().unwrap_or_else(|| json!(1));
        Some(json!({"item_id": item_id, "quantity": 1}))
    }

    async fn after(&mut self, ctx: &mut Context, response: &Response) {
        if response.error().is_none() && !response.is_ok() {
            let status = response.status().unwrap_or(0);
            ctx.record_scenario_error(
                Some("checkout"),
                format!("order rejected with status {}", status),
            );
        }
    }
}

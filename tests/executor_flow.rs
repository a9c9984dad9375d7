//! Single-user executor flows: weighted choice, abort, sub-scenario
//! resolution, and reproducibility under a fixed seed.

use std::sync::Arc;

use serde_json::{Value, json};

use loadsmith::registry::ScreenFuture;
use loadsmith::{Configuration, Context, Executor, Registry};

fn record_visit(ctx: &mut Context) -> ScreenFuture<'_> {
    Box::pin(async move {
        let screen = ctx.current_screen().unwrap_or("?").to_owned();
        let entry = ctx
            .store_mut()
            .entry("visits".to_owned())
            .or_insert_with(|| json!([]));
        if let Value::Array(list) = entry {
            list.push(json!(screen));
        }
        Ok(())
    })
}

fn record_and_abort(ctx: &mut Context) -> ScreenFuture<'_> {
    Box::pin(async move {
        record_visit(ctx).await?;
        ctx.abort();
        Ok(())
    })
}

fn failing(_ctx: &mut Context) -> ScreenFuture<'_> {
    Box::pin(async move { Err("boom".into()) })
}

fn visits(ctx: &Context) -> Vec<String> {
    ctx.store()
        .get("visits")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

fn fresh_context() -> Context {
    Context::new(1, Arc::new(Configuration::default()))
}

#[tokio::test]
async fn weight_extremes_never_pick_zero() -> Result<(), String> {
    let mut registry = Registry::default();
    registry.add_screen("a", record_visit);
    registry.add_screen("b", record_visit);
    registry
        .add_scenario("main", |builder| {
            builder.choose(|c| {
                c.percent(100, |b| {
                    b.visit("a");
                });
                c.percent(0, |b| {
                    b.visit("b");
                });
            });
        })
        .map_err(|err| err.to_string())?;
    let registry = Arc::new(registry);
    let steps = registry.scenario("main").ok_or("scenario missing")?;

    let mut executor = Executor::seeded(Arc::clone(&registry), 7);
    let mut ctx = fresh_context();
    for _ in 0..10 {
        executor.execute(&steps, &mut ctx).await;
    }

    let seen = visits(&ctx);
    assert_eq!(seen.len(), 10);
    assert!(seen.iter().all(|screen| screen == "a"));
    Ok(())
}

#[tokio::test]
async fn abort_stops_the_walk_without_errors() -> Result<(), String> {
    let mut registry = Registry::default();
    registry.add_screen("a", record_and_abort);
    registry.add_screen("b", record_visit);
    registry
        .add_scenario("main", |builder| {
            builder.visit("a").visit("b");
        })
        .map_err(|err| err.to_string())?;
    let registry = Arc::new(registry);
    let steps = registry.scenario("main").ok_or("scenario missing")?;

    let mut executor = Executor::new(Arc::clone(&registry));
    let mut ctx = fresh_context();
    executor.execute(&steps, &mut ctx).await;

    assert_eq!(visits(&ctx), vec!["a".to_owned()]);
    assert!(ctx.scenario_errors().is_empty());
    Ok(())
}

#[tokio::test]
async fn sub_scenarios_resolve_through_the_registry() -> Result<(), String> {
    let mut registry = Registry::default();
    registry.add_screen("x", record_visit);
    registry.add_screen("y", record_visit);
    registry
        .add_scenario("sub", |builder| {
            builder.visit("y");
        })
        .map_err(|err| err.to_string())?;
    registry
        .add_scenario("main", |builder| {
            builder.choose(|c| {
                c.percent_scenario(100, "sub");
            });
        })
        .map_err(|err| err.to_string())?;
    let registry = Arc::new(registry);
    let steps = registry.scenario("main").ok_or("scenario missing")?;

    let mut executor = Executor::new(Arc::clone(&registry));
    let mut ctx = fresh_context();
    executor.execute(&steps, &mut ctx).await;

    assert_eq!(visits(&ctx), vec!["y".to_owned()]);
    Ok(())
}

#[tokio::test]
async fn unknown_screen_records_an_error_and_continues() -> Result<(), String> {
    let mut registry = Registry::default();
    registry.add_screen("b", record_visit);
    registry.add_scenario_steps(
        "main",
        {
            let mut builder = loadsmith::ScenarioBuilder::new();
            builder.visit("ghost").visit("b");
            builder.build().map_err(|err| err.to_string())?
        },
    );
    let registry = Arc::new(registry);
    let steps = registry.scenario("main").ok_or("scenario missing")?;

    let mut executor = Executor::new(Arc::clone(&registry));
    let mut ctx = fresh_context();
    executor.execute(&steps, &mut ctx).await;

    assert_eq!(visits(&ctx), vec!["b".to_owned()]);
    assert_eq!(ctx.scenario_errors().len(), 1);
    assert!(ctx.scenario_errors()[0].message.contains("ghost"));
    assert!(ctx.metrics().is_empty());
    Ok(())
}

#[tokio::test]
async fn unknown_sub_scenario_is_non_fatal() -> Result<(), String> {
    let mut registry = Registry::default();
    registry.add_screen("a", record_visit);
    registry
        .add_scenario("main", |builder| {
            builder
                .choose(|c| {
                    c.percent_scenario(100, "phantom");
                })
                .visit("a");
        })
        .map_err(|err| err.to_string())?;
    let registry = Arc::new(registry);
    let steps = registry.scenario("main").ok_or("scenario missing")?;

    let mut executor = Executor::new(Arc::clone(&registry));
    let mut ctx = fresh_context();
    executor.execute(&steps, &mut ctx).await;

    assert_eq!(visits(&ctx), vec!["a".to_owned()]);
    assert_eq!(ctx.scenario_errors().len(), 1);
    assert!(ctx.scenario_errors()[0].message.contains("phantom"));
    Ok(())
}

#[tokio::test]
async fn failing_screen_records_error_and_walk_continues() -> Result<(), String> {
    let mut registry = Registry::default();
    registry.add_screen("broken", failing);
    registry.add_screen("b", record_visit);
    registry
        .add_scenario("main", |builder| {
            builder.visit("broken").visit("b");
        })
        .map_err(|err| err.to_string())?;
    let registry = Arc::new(registry);
    let steps = registry.scenario("main").ok_or("scenario missing")?;

    let mut executor = Executor::new(Arc::clone(&registry));
    let mut ctx = fresh_context();
    executor.execute(&steps, &mut ctx).await;

    assert_eq!(visits(&ctx), vec!["b".to_owned()]);
    assert_eq!(ctx.scenario_errors().len(), 1);
    assert!(ctx.scenario_errors()[0].message.contains("boom"));
    assert_eq!(ctx.scenario_errors()[0].screen.as_deref(), Some("broken"));
    Ok(())
}

#[tokio::test]
async fn fixed_seed_reproduces_the_visit_sequence() -> Result<(), String> {
    let mut registry = Registry::default();
    for screen in ["a", "b", "c"] {
        registry.add_screen(screen, record_visit);
    }
    registry
        .add_scenario("main", |builder| {
            builder.choose(|c| {
                c.percent(20, |b| {
                    b.visit("a");
                });
                c.percent(30, |b| {
                    b.visit("b");
                });
                c.percent(50, |b| {
                    b.visit("c");
                });
            });
        })
        .map_err(|err| err.to_string())?;
    let registry = Arc::new(registry);
    let steps = registry.scenario("main").ok_or("scenario missing")?;

    let mut walks = Vec::new();
    for _ in 0..2 {
        let mut executor = Executor::seeded(Arc::clone(&registry), 42);
        let mut ctx = fresh_context();
        for _ in 0..20 {
            executor.execute(&steps, &mut ctx).await;
        }
        walks.push(visits(&ctx));
    }

    assert_eq!(walks[0], walks[1]);
    assert_eq!(walks[0].len(), 20);
    Ok(())
}

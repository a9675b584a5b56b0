//! Demo routes served by the binary.

use fncmp_core::EventKind;
use fncmp_server::{CallbackResult, Context, FnComponent, SessionHandler};

/// Register the demo routes on `handler`.
pub fn register(handler: &SessionHandler) {
    handler.route("/", counter_page);
    handler.route("/greet", greet_page);
}

fn counter_markup(count: i64) -> String {
    format!(r#"<h1>Count: <span id="count">{count}</span></h1>"#)
}

async fn counter_page(ctx: Context) -> CallbackResult {
    let count = ctx.cache::<i64>("count")?.value()?;
    let increment = FnComponent::html("<button>+1</button>")
        .with_id("increment")
        .with_listener(EventKind::Click, increment);
    let reset = FnComponent::html("<button>reset</button>")
        .with_id("reset")
        .with_listener(EventKind::Click, reset);

    // the page goes out first so the buttons have a container to land in
    let page = FnComponent::html(format!(r#"{}<div id="controls"></div>"#, counter_markup(count))).with_id("counter");
    ctx.push(page).await?;
    ctx.push(increment.append("controls")).await?;
    Ok(reset.append("controls"))
}

async fn increment(ctx: Context) -> CallbackResult {
    let count = ctx.cache::<i64>("count")?.update(|n| n + 1)?;
    Ok(FnComponent::html(count.to_string()).swap_inner("count"))
}

async fn reset(ctx: Context) -> CallbackResult {
    ctx.cache::<i64>("count")?.set(0)?;
    Ok(FnComponent::html("0").swap_inner("count"))
}

async fn greet_page(_ctx: Context) -> CallbackResult {
    Ok(FnComponent::html(r#"<input placeholder="name"><p id="greeting"></p>"#)
        .with_id("greet")
        .with_listener(EventKind::Input, greet))
}

async fn greet(ctx: Context) -> CallbackResult {
    let name: String = ctx.data()?;
    if name.trim().is_empty() {
        return Ok(FnComponent::html(" ").swap_inner("greeting"));
    }
    Ok(FnComponent::html(format!("Hello, {}!", escape_text(name.trim()))).swap_inner("greeting"))
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

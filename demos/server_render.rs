//! Rendering on a server: modules defined once, one host store per request

use serde::{Deserialize, Serialize};
use serde_json::Value;
use simplux::store::combine_reducers;
use simplux::{Action, Config, ModuleConfig, Mutation, Reducer, Registry, Store};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct Page {
    title: String,
    visits: u32,
}

fn request_counter() -> Reducer<Value> {
    Arc::new(|state: Option<&Value>, action: &Action| -> simplux::Result<Value> {
        let count = state.and_then(Value::as_u64).unwrap_or(0);
        Ok(Value::from(if action.kind == "REQUEST" { count + 1 } else { count }))
    })
}

fn render(
    registry: &Registry,
    visit: &Mutation<Page, (String,)>,
    title: &str,
) -> simplux::Result<String> {
    // Each request gets a fresh host store owning the simplux state under its
    // own key.
    let host = Store::new(combine_reducers([
        ("simplux", registry.root_reducer()),
        ("requests", request_counter()),
    ]))?;
    let cleanup = registry.set_store(host.clone(), |state: &Value| state["simplux"].clone());

    host.dispatch(Action::new("REQUEST"))?;
    let page = visit.call((title.to_string(),))?;

    let html = format!(
        "<h1>{}</h1><p>visits: {}</p><script>window.__STATE__ = {}</script>",
        page.title,
        page.visits,
        host.state()
    );

    cleanup.cleanup()?;
    Ok(html)
}

fn main() -> simplux::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Modules and mutations are defined once at startup.
    let registry = Registry::with_config(Config::default().without_default_store());
    let page = registry.create_module(ModuleConfig::new("page", Page::default()))?;
    let visit = page.create_mutation("visit", |state: &mut Page, (title,): (String,)| {
        state.title = title;
        state.visits += 1;
    })?;

    for title in ["Home", "About"] {
        println!("{}", render(&registry, &visit, title)?);
    }

    Ok(())
}

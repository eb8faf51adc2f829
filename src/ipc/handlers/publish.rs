use serde_json::json;

use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::publish::PublishError;

fn status_view(state: &AppState) -> serde_json::Value {
    json!({
        "phase": state.publish.phase().as_str(),
        "selected": state.selection.ids(),
        "lastAttempt": state.publish.last_attempt(),
    })
}

fn publish_err(state: &AppState, req: &Request, e: PublishError) -> serde_json::Value {
    err(
        &req.id,
        e.code(),
        e.to_string(),
        Some(json!({ "phase": state.publish.phase().as_str() })),
    )
}

fn handle_publish_request(state: &mut AppState, req: &Request) -> serde_json::Value {
    match state.publish.request_publish(&state.selection) {
        Ok(()) => ok(&req.id, status_view(state)),
        Err(e) => publish_err(state, req, e),
    }
}

fn handle_publish_confirm(state: &mut AppState, req: &Request) -> serde_json::Value {
    let outcome = state
        .publish
        .confirm(&mut state.selection, state.api.as_ref());
    match outcome {
        Ok(receipt) => {
            // Stale once published; selectAll needs a fresh results.list.
            state.results = None;
            let mut view = status_view(state);
            view["attemptId"] = json!(receipt.attempt_id);
            view["published"] = json!(receipt.published);
            view["refetch"] = json!(receipt.refetch);
            ok(&req.id, view)
        }
        Err(e) => publish_err(state, req, e),
    }
}

fn handle_publish_cancel(state: &mut AppState, req: &Request) -> serde_json::Value {
    match state.publish.cancel() {
        Ok(()) => ok(&req.id, status_view(state)),
        Err(e) => publish_err(state, req, e),
    }
}

fn handle_publish_reset(state: &mut AppState, req: &Request) -> serde_json::Value {
    match state.publish.reset() {
        Ok(()) => ok(&req.id, status_view(state)),
        Err(e) => publish_err(state, req, e),
    }
}

fn handle_publish_status(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(&req.id, status_view(state))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "publish.request" => Some(handle_publish_request(state, req)),
        "publish.confirm" => Some(handle_publish_confirm(state, req)),
        "publish.cancel" => Some(handle_publish_cancel(state, req)),
        "publish.reset" => Some(handle_publish_reset(state, req)),
        "publish.status" => Some(handle_publish_status(state, req)),
        _ => None,
    }
}

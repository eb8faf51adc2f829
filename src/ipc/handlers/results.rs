use serde_json::json;
use tracing::{debug, info};

use crate::api::ResultListing;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{required_str, typed_param};
use crate::ipc::types::{AppState, Request};
use crate::view::{paginate, ResultQuery, ViewState};

fn selection_view(state: &AppState) -> serde_json::Value {
    json!({
        "selected": state.selection.ids(),
        "count": state.selection.len(),
    })
}

fn handle_results_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let query: ResultQuery = match typed_param(req, "query") {
        Ok(v) => v.unwrap_or_else(|| state.query.clone()),
        Err(resp) => return resp,
    };
    let page = req
        .params
        .get("page")
        .and_then(|v| v.as_u64())
        .map(|v| v as usize)
        .unwrap_or(1);
    let page_size = req
        .params
        .get("pageSize")
        .and_then(|v| v.as_u64())
        .map(|v| v as usize)
        .unwrap_or(state.config.view.page_size);
    let search = req
        .params
        .get("search")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    let listing = match state.api.list_results(&query) {
        Ok(v) => v,
        Err(e) => return err(&req.id, e.code(), e.to_string(), None),
    };
    info!(
        count = listing.records.len(),
        skipped = listing.skipped.len(),
        "results fetched"
    );
    let ResultListing { records, skipped } = listing;

    state.query = query;
    state.view = ViewState {
        page,
        page_size,
        search,
    };
    let records = &*state.results.insert(records);

    let page = paginate(records, &state.view);
    let eligible = page.eligible_ids();
    let dropped = state.selection.reconcile(&eligible);
    if !dropped.is_empty() {
        debug!(dropped = dropped.len(), "stale selections removed");
    }
    let mut eligible_ids: Vec<&String> = eligible.iter().collect();
    eligible_ids.sort();

    ok(
        &req.id,
        json!({
            "page": page.page,
            "pageSize": page.page_size,
            "pageCount": page.page_count,
            "matched": page.matched,
            "records": page.records,
            "eligibleIds": eligible_ids,
            "selected": state.selection.ids(),
            "droppedFromSelection": dropped,
            "skippedRows": skipped,
        }),
    )
}

fn handle_selection_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let mut view = selection_view(state);
    if let Some(id) = req.params.get("id").and_then(|v| v.as_str()) {
        view["id"] = json!(id);
        view["isSelected"] = json!(state.selection.contains(id));
    }
    ok(&req.id, view)
}

fn handle_selection_toggle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let id = match required_str(req, "id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let selected = state.selection.toggle(id);
    let mut view = selection_view(state);
    view["id"] = json!(id);
    view["isSelected"] = json!(selected);
    ok(&req.id, view)
}

fn handle_selection_select_all(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(records) = state.results.as_ref() else {
        return err(&req.id, "no_results", "list results first", None);
    };
    let eligible = paginate(records, &state.view).eligible_ids();
    state.selection.select_all_visible(eligible);
    ok(&req.id, selection_view(state))
}

fn handle_selection_clear(state: &mut AppState, req: &Request) -> serde_json::Value {
    state.selection.clear();
    ok(&req.id, selection_view(state))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "results.list" => Some(handle_results_list(state, req)),
        "selection.get" => Some(handle_selection_get(state, req)),
        "selection.toggle" => Some(handle_selection_toggle(state, req)),
        "selection.selectAll" => Some(handle_selection_select_all(state, req)),
        "selection.clear" => Some(handle_selection_clear(state, req)),
        _ => None,
    }
}

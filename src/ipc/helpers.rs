use serde::de::DeserializeOwned;

use crate::ipc::error::err;
use crate::ipc::types::Request;

pub fn str_param<'a>(req: &'a Request, key: &str) -> Option<&'a str> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Missing or blank string params become a `bad_params` response.
pub fn required_str<'a>(req: &'a Request, key: &str) -> Result<&'a str, serde_json::Value> {
    str_param(req, key).ok_or_else(|| err(&req.id, "bad_params", format!("missing {key}"), None))
}

/// Absent or null params decode to `None`; anything else must match `T`.
pub fn typed_param<T: DeserializeOwned>(
    req: &Request,
    key: &str,
) -> Result<Option<T>, serde_json::Value> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => serde_json::from_value(v.clone()).map(Some).map_err(|e| {
            err(
                &req.id,
                "bad_params",
                format!("invalid {key}: {e}"),
                None,
            )
        }),
    }
}

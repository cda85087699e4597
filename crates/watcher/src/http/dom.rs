//! Handlers for `/dom/*`: resolve a CSS selector against the live page and
//! act on it, or snapshot the whole tree as a compact indented text dump.

use argus_cdp::CdpSession;
use axum::extract::State;
use axum::response::Response;
use crate::http::ArgusJson as Json;
use serde::Deserialize;
use serde_json::json;

use super::{ok_json, AppState};
use crate::error::ArgusError;
use crate::http::ApiError;

async fn require_session(state: &AppState) -> Result<CdpSession, ApiError> {
    state
        .connection
        .current_session()
        .await
        .ok_or_else(|| ApiError(ArgusError::Disconnected))
}

/// Resolves a selector to a `(nodeId, backendNodeId)` pair, or `not_available`
/// if nothing matches.
async fn resolve_selector(session: &CdpSession, selector: &str) -> Result<i64, ApiError> {
    session
        .query_selector(selector)
        .await
        .map_err(ArgusError::from)?
        .ok_or_else(|| ApiError(ArgusError::NotAvailable(format!("selector '{selector}' matched no node"))))
}

fn center_of_box_model(model: &serde_json::Value) -> Result<(f64, f64), ApiError> {
    let quad = model
        .get("model")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_array())
        .ok_or_else(|| ApiError(ArgusError::Internal("getBoxModel returned no content quad".into())))?;
    let xs: Vec<f64> = quad.iter().step_by(2).filter_map(|v| v.as_f64()).collect();
    let ys: Vec<f64> = quad.iter().skip(1).step_by(2).filter_map(|v| v.as_f64()).collect();
    if xs.len() != 4 || ys.len() != 4 {
        return Err(ApiError(ArgusError::Internal("malformed content quad".into())));
    }
    let cx = xs.iter().sum::<f64>() / 4.0;
    let cy = ys.iter().sum::<f64>() / 4.0;
    Ok((cx, cy))
}

#[derive(Debug, Deserialize)]
pub struct SelectorBody {
    selector: String,
}

pub async fn info(
    State(state): State<AppState>,
    Json(body): Json<SelectorBody>,
) -> Result<Response, ApiError> {
    let session = require_session(&state).await?;
    let backend_node_id = resolve_selector(&session, &body.selector).await?;
    let model = session.box_model(backend_node_id).await.map_err(ArgusError::from)?;
    let described = session
        .send("DOM.describeNode", Some(json!({ "backendNodeId": backend_node_id, "depth": 0 })))
        .await
        .map_err(ArgusError::from)?;
    let node = described.get("node").cloned().unwrap_or(json!(null));
    let rect = model.get("model").and_then(|m| m.get("content")).and_then(|c| c.as_array()).map(|quad| {
        let xs: Vec<f64> = quad.iter().step_by(2).filter_map(|v| v.as_f64()).collect();
        let ys: Vec<f64> = quad.iter().skip(1).step_by(2).filter_map(|v| v.as_f64()).collect();
        json!({
            "x": xs.iter().cloned().fold(f64::INFINITY, f64::min),
            "y": ys.iter().cloned().fold(f64::INFINITY, f64::min),
            "width": xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max) - xs.iter().cloned().fold(f64::INFINITY, f64::min),
            "height": ys.iter().cloned().fold(f64::NEG_INFINITY, f64::max) - ys.iter().cloned().fold(f64::INFINITY, f64::min),
        })
    });

    Ok(ok_json(json!({
        "ok": true,
        "backendNodeId": backend_node_id,
        "node": node,
        "rect": rect,
    })))
}

pub async fn click(
    State(state): State<AppState>,
    Json(body): Json<SelectorBody>,
) -> Result<Response, ApiError> {
    let session = require_session(&state).await?;
    let backend_node_id = resolve_selector(&session, &body.selector).await?;
    let model = session.box_model(backend_node_id).await.map_err(ArgusError::from)?;
    let (x, y) = center_of_box_model(&model)?;
    dispatch_mouse_click(&session, x, y).await?;
    Ok(ok_json(json!({ "ok": true })))
}

pub async fn hover(
    State(state): State<AppState>,
    Json(body): Json<SelectorBody>,
) -> Result<Response, ApiError> {
    let session = require_session(&state).await?;
    let backend_node_id = resolve_selector(&session, &body.selector).await?;
    let model = session.box_model(backend_node_id).await.map_err(ArgusError::from)?;
    let (x, y) = center_of_box_model(&model)?;
    session
        .send(
            "Input.dispatchMouseEvent",
            Some(json!({ "type": "mouseMoved", "x": x, "y": y })),
        )
        .await
        .map_err(ArgusError::from)?;
    Ok(ok_json(json!({ "ok": true })))
}

async fn dispatch_mouse_click(session: &CdpSession, x: f64, y: f64) -> Result<(), ApiError> {
    session
        .send(
            "Input.dispatchMouseEvent",
            Some(json!({ "type": "mousePressed", "x": x, "y": y, "button": "left", "clickCount": 1 })),
        )
        .await
        .map_err(ArgusError::from)?;
    session
        .send(
            "Input.dispatchMouseEvent",
            Some(json!({ "type": "mouseReleased", "x": x, "y": y, "button": "left", "clickCount": 1 })),
        )
        .await
        .map_err(ArgusError::from)?;
    Ok(())
}

pub async fn focus(
    State(state): State<AppState>,
    Json(body): Json<SelectorBody>,
) -> Result<Response, ApiError> {
    let session = require_session(&state).await?;
    let backend_node_id = resolve_selector(&session, &body.selector).await?;
    session
        .send("DOM.focus", Some(json!({ "backendNodeId": backend_node_id })))
        .await
        .map_err(ArgusError::from)?;
    Ok(ok_json(json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
pub struct FillBody {
    selector: String,
    value: String,
}

pub async fn fill(
    State(state): State<AppState>,
    Json(body): Json<FillBody>,
) -> Result<Response, ApiError> {
    let session = require_session(&state).await?;
    let backend_node_id = resolve_selector(&session, &body.selector).await?;
    session
        .send("DOM.setAttributeValue", Some(json!({ "backendNodeId": backend_node_id, "name": "value", "value": body.value })))
        .await
        .map_err(ArgusError::from)?;
    session
        .send("DOM.focus", Some(json!({ "backendNodeId": backend_node_id })))
        .await
        .map_err(ArgusError::from)?;
    session
        .send("Input.insertText", Some(json!({ "text": body.value })))
        .await
        .map_err(ArgusError::from)?;
    Ok(ok_json(json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
pub struct SetFileBody {
    selector: String,
    files: Vec<String>,
}

pub async fn set_file(
    State(state): State<AppState>,
    Json(body): Json<SetFileBody>,
) -> Result<Response, ApiError> {
    let session = require_session(&state).await?;
    let backend_node_id = resolve_selector(&session, &body.selector).await?;
    session
        .send(
            "DOM.setFileInputFiles",
            Some(json!({ "backendNodeId": backend_node_id, "files": body.files })),
        )
        .await
        .map_err(ArgusError::from)?;
    Ok(ok_json(json!({ "ok": true })))
}

pub async fn tree(State(state): State<AppState>) -> Result<Response, ApiError> {
    let session = require_session(&state).await?;
    let document = session.get_document().await.map_err(ArgusError::from)?;

    let mut service = argus_dom::DomService::new();
    service.parse_cdp_dom_tree(&document).map_err(ArgusError::from)?;
    let serializer = argus_dom::DomSerializer::new();
    let text = serializer.serialize(service.arena()).map_err(ArgusError::from)?;

    Ok(ok_json(json!({ "ok": true, "tree": text })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_of_box_model_averages_quad_corners() {
        let model = json!({ "model": { "content": [0.0, 0.0, 10.0, 0.0, 10.0, 20.0, 0.0, 20.0] } });
        let (x, y) = center_of_box_model(&model).unwrap();
        assert_eq!(x, 5.0);
        assert_eq!(y, 10.0);
    }

    #[test]
    fn center_of_box_model_rejects_malformed_quad() {
        let model = json!({ "model": { "content": [0.0, 0.0] } });
        assert!(center_of_box_model(&model).is_err());
    }
}

use calm_rs_visualizer::{RenderOptions, Theme, render_with_options};
use serde::Deserialize;
use wasm_bindgen::prelude::*;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalmRenderOptions {
    theme: Option<String>,
    font_family: Option<String>,
    font_size: Option<f32>,
}

fn build_render_options(options: CalmRenderOptions) -> Result<RenderOptions, String> {
    let mut render_options = RenderOptions::default();
    if let Some(name) = options.theme.as_deref() {
        render_options.theme = Theme::by_name(name).ok_or_else(|| format!("unknown theme `{name}`"))?;
    }
    if let Some(font_family) = options.font_family {
        render_options.theme.font_family = font_family;
    }
    if let Some(font_size) = options.font_size {
        render_options.theme.font_size = font_size;
    }
    Ok(render_options)
}

#[wasm_bindgen]
pub fn render_calm_svg(source: &str, options_json: Option<String>) -> Result<String, JsValue> {
    let options = if let Some(raw_options) = options_json {
        serde_json::from_str::<CalmRenderOptions>(&raw_options)
            .map_err(|error| JsValue::from_str(&error.to_string()))?
    } else {
        CalmRenderOptions::default()
    };

    let render_options = build_render_options(options).map_err(|error| JsValue::from_str(&error))?;
    render_with_options(source, render_options).map_err(|error| JsValue::from_str(&error.to_string()))
}

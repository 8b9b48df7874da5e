//! Render markdown resources to HTML at serve time.

use std::path::Path;
use std::sync::Arc;

use axum::http::{HeaderMap, HeaderValue};
use axum::response::Response;
use pulldown_cmark::{html, Options, Parser};
use tera::{Context, Tera};
use tracing::warn;

use crate::errors::WebError;
use crate::ext::Extension;
use crate::pipeline::{serve_fn, PipelineBuilder, ServeHandler};
use crate::resource::Resource;

const MARKDOWN_TEMPLATE_NAME: &str = "markdown";

/// Whether the resource is markdown, by content type or key extension.
pub fn is_markdown(res: &Resource) -> bool {
    res.info.content_type.to_ascii_lowercase().contains("markdown")
        || res.info.key.to_ascii_lowercase().ends_with(".md")
}

/// Render a markdown document to an HTML fragment.
pub fn render_markdown(source: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_SMART_PUNCTUATION);
    options.insert(Options::ENABLE_TASKLISTS);

    let parser = Parser::new_ext(source, options);
    let mut out = String::with_capacity(source.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

/// HTML page template that receives the rendered markdown as `content`.
pub struct MarkdownRenderer {
    tera: Tera,
}

impl MarkdownRenderer {
    /// Parse a template from its source text.
    pub fn from_source(source: &str) -> Result<Self, WebError> {
        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        tera.add_raw_template(MARKDOWN_TEMPLATE_NAME, source)?;
        Ok(Self { tera })
    }

    /// Read and parse a template file.  `Ok(None)` if the file does not
    /// exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Option<Self>, WebError> {
        match std::fs::read_to_string(path.as_ref()) {
            Ok(source) => Self::from_source(&source).map(Some),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Render markdown bytes into the page template.
    pub fn render(&self, markdown: &[u8]) -> Result<String, WebError> {
        let source = String::from_utf8_lossy(markdown);
        let mut context = Context::new();
        context.insert("content", &render_markdown(&source));
        Ok(self.tera.render(MARKDOWN_TEMPLATE_NAME, &context)?)
    }

    /// Wrap a serve step so markdown resources are answered with the
    /// rendered page.  Everything else is passed through untouched.
    pub fn decorate(self: &Arc<Self>, inner: ServeHandler) -> ServeHandler {
        let renderer = Arc::clone(self);
        serve_fn(move |mut headers: HeaderMap, mut res: Resource| {
            let inner = Arc::clone(&inner);
            let renderer = Arc::clone(&renderer);
            async move {
                if !is_markdown(&res) || !res.has_data() {
                    return inner(headers, res).await;
                }

                let source = res.materialize().await?;
                let page = renderer.render(&source)?;

                headers.insert(
                    "content-type",
                    HeaderValue::from_static("text/html; charset=utf-8"),
                );
                headers.insert("content-length", HeaderValue::from(page.len()));
                let mut response = Response::new(page.into());
                *response.headers_mut() = headers;
                Ok(response)
            }
        })
    }
}

/// Install markdown rendering on the serve step.
///
/// A missing template file disables the extension; an unreadable or
/// malformed one aborts startup.
pub fn markdown_extension(template: String) -> Extension {
    Box::new(move |builder: &mut PipelineBuilder| {
        let Some(renderer) = MarkdownRenderer::load(&template)? else {
            warn!("Markdown template {} not found", template);
            return Ok("markdown rendering: disabled".to_string());
        };
        let renderer = Arc::new(renderer);
        builder.apply_serve(|serve| renderer.decorate(serve));
        Ok("markdown rendering: enabled".to_string())
    })
}

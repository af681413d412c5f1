/// Page template and static assets
///
/// Release builds serve everything from the files bundled into the binary.
/// In dev mode the template is re-read on every render and assets are
/// served straight from the ui directory.
use crate::error::{ServiceError, ServiceResult};
use axum::{
    extract::Path,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use minijinja::Environment;
use rust_embed::RustEmbed;
use serde::Serialize;
use std::path::PathBuf;
use tower_http::services::ServeDir;

/// Name of the page template
pub const INDEX_TEMPLATE: &str = "index.html";

#[derive(RustEmbed)]
#[folder = "ui/"]
struct Assets;

/// Template renderer
pub struct Templates {
    live_dir: Option<PathBuf>,
    env: Environment<'static>,
}

impl Templates {
    /// Templates compiled from the bundled ui files
    pub fn embedded() -> ServiceResult<Self> {
        let file = Assets::get(INDEX_TEMPLATE).ok_or_else(|| {
            ServiceError::Internal(format!("{} missing from bundle", INDEX_TEMPLATE))
        })?;
        let source = String::from_utf8(file.data.into_owned())
            .map_err(|e| ServiceError::Internal(format!("{} is not UTF-8: {}", INDEX_TEMPLATE, e)))?;

        let mut env = Environment::new();
        env.add_template_owned(INDEX_TEMPLATE, source)?;
        Ok(Self {
            live_dir: None,
            env,
        })
    }

    /// Templates loaded from `dir` at render time
    pub fn live(dir: impl Into<PathBuf>) -> Self {
        Self {
            live_dir: Some(dir.into()),
            env: Environment::new(),
        }
    }

    /// Render a template; HTML output is autoescaped
    pub fn render<S: Serialize>(&self, name: &str, ctx: S) -> ServiceResult<String> {
        match &self.live_dir {
            Some(dir) => {
                let mut env = Environment::new();
                env.set_loader(minijinja::path_loader(dir));
                Ok(env.get_template(name)?.render(ctx)?)
            }
            None => Ok(self.env.get_template(name)?.render(ctx)?),
        }
    }
}

/// Routes for `/ui/*`
pub fn asset_routes<S>(live_dir: Option<PathBuf>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    match live_dir {
        Some(dir) => Router::new().nest_service("/ui", ServeDir::new(dir)),
        None => Router::new().route("/ui/*path", axum::routing::get(bundled_asset)),
    }
}

/// Serve a file from the bundled assets
async fn bundled_asset(Path(path): Path<String>) -> Response {
    match Assets::get(&path) {
        Some(file) => {
            let mime = mime_guess::from_path(&path).first_or_octet_stream();
            (
                [(header::CONTENT_TYPE, mime.as_ref().to_string())],
                file.data.into_owned(),
            )
                .into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::DisplayProjection;
    use crate::identity::IdentityRecord;

    fn projection(login: &str, display: &str) -> DisplayProjection {
        let record = IdentityRecord::new(login, display).unwrap();
        DisplayProjection {
            initial: Some(record.initial()),
            record: Some(record),
        }
    }

    #[test]
    fn test_embedded_renders_identity() {
        let templates = Templates::embedded().unwrap();
        let html = templates
            .render(INDEX_TEMPLATE, projection("ada@example.com", "Ada Lovelace"))
            .unwrap();
        assert!(html.contains("Ada Lovelace"));
        assert!(html.contains("ada@example.com"));
    }

    #[test]
    fn test_embedded_renders_anonymous() {
        let templates = Templates::embedded().unwrap();
        let html = templates
            .render(
                INDEX_TEMPLATE,
                DisplayProjection {
                    record: None,
                    initial: None,
                },
            )
            .unwrap();
        assert!(!html.contains("class=\"avatar\""));
    }

    #[test]
    fn test_html_is_escaped() {
        let templates = Templates::embedded().unwrap();
        let html = templates
            .render(INDEX_TEMPLATE, projection("x", "<script>alert(1)</script>"))
            .unwrap();
        assert!(!html.contains("<script>alert(1)</script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_live_templates_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(INDEX_TEMPLATE);
        let templates = Templates::live(dir.path());

        std::fs::write(&path, "v1 {{ initial }}").unwrap();
        assert_eq!(
            templates.render(INDEX_TEMPLATE, projection("carol", "")).unwrap(),
            "v1 c"
        );

        std::fs::write(&path, "v2 {{ initial }}").unwrap();
        assert_eq!(
            templates.render(INDEX_TEMPLATE, projection("carol", "")).unwrap(),
            "v2 c"
        );
    }

    #[test]
    fn test_live_missing_template_is_render_error() {
        let dir = tempfile::tempdir().unwrap();
        let templates = Templates::live(dir.path());
        let err = templates.render(INDEX_TEMPLATE, ()).unwrap_err();
        assert!(matches!(err, ServiceError::Render(_)));
    }
}

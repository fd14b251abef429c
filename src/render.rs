//! HTML rendering. The page is produced as a sequence of fragments so the
//! server can flush everything up to the loading spinner before the model
//! answers

use crate::config::BACKGROUND_BLUR_SIGMA;
use crate::ingest::{preview_label, EncodedImage};
use crate::model::ModelResponse;
use crate::question::Query;
use anyhow::{Context, Result};
use base64::{engine::general_purpose, Engine as _};
use image::ImageOutputFormat;
use std::fmt::Write as _;
use std::io::Cursor;
use std::path::Path;
use tracing::*;

const TITLE: &str = "Home Decor AI Assistant";
const TAGLINE: &str = "Get personalized recommendations for your dream home decor.";

const STYLE: &str = r#"<style>
    body { font-family: sans-serif; margin: 0 auto; max-width: 760px; padding: 0 16px 48px; }
    .background { width: 100%; display: block; }
    .banner { position: relative; text-align: center; margin-top: -150px; min-height: 150px; }
    .banner h1 { color: white; text-shadow: 2px 2px 4px rgba(0, 0, 0, 0.5); }
    .banner p { color: white; font-size: 20px; font-weight: bold; text-shadow: 1px 1px 4px rgba(0, 0, 0, 0.5); margin-top: -20px; }
    .previews { display: flex; gap: 12px; }
    .previews figure { flex: 1; margin: 0; }
    .previews img { width: 100%; }
    .question { background-color: #f0f0f0; padding: 16px; border-radius: 8px; }
    .response { background-color: #e6f7ff; padding: 16px; border-radius: 8px; margin-top: 20px; }
    .error { background-color: #ffe6e6; color: #a30000; padding: 16px; border-radius: 8px; margin-top: 20px; }
    .question h3, .response h3, .error h3 { margin-top: 0; }
    @keyframes spinner-rotation {
        from { transform: rotate(0deg); }
        to { transform: rotate(360deg); }
    }
    .spinner-box { display: flex; justify-content: center; align-items: center; margin-top: 20px; }
    .spinner {
        width: 48px;
        height: 48px;
        border-radius: 50%;
        border: 8px solid #f3f3f3;
        border-top: 8px solid #3498db;
        animation: spinner-rotation 1s linear infinite;
    }
</style>"#;

/// Hides the spinner once the answer has been streamed after it
const SPINNER_DONE: &str = "<style>#spinner { display: none; }</style>";

/// Escape text for use in HTML content and attribute values
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Load the background, blur it, and return it as a PNG data URI
pub fn blurred_background(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let img = image::open(path).with_context(|| format!("failed to open {path:?}"))?;
    let blurred = img.blur(BACKGROUND_BLUR_SIGMA);

    let mut png = Vec::new();
    blurred
        .write_to(&mut Cursor::new(&mut png), ImageOutputFormat::Png)
        .context("failed to encode the background")?;
    Ok(format!(
        "data:image/png;base64,{}",
        general_purpose::STANDARD.encode(png)
    ))
}

/// Renders the fragments of the assistant page
#[derive(Debug, Clone, Default)]
pub struct Page {
    background: Option<String>,
}

impl Page {
    pub fn new(background: Option<String>) -> Self {
        Page { background }
    }

    /// Build the page around the background at `path`, going without the
    /// decoration if it cannot be loaded
    pub fn load(path: impl AsRef<Path>) -> Self {
        match blurred_background(path) {
            Ok(uri) => Page::new(Some(uri)),
            Err(e) => {
                warn!("rendering without a background: {e:#}");
                Page::new(None)
            }
        }
    }

    /// Document head, background decoration and title banner
    pub fn header(&self) -> String {
        let mut html = format!(
            "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>{TITLE}</title>\n{STYLE}\n</head>\n<body>\n"
        );
        if let Some(uri) = &self.background {
            let _ = writeln!(html, "<img class=\"background\" alt=\"\" src=\"{uri}\">");
        }
        let _ = writeln!(
            html,
            "<div class=\"banner\">\n<h1>{TITLE}</h1>\n<p>{TAGLINE}</p>\n</div>"
        );
        html
    }

    /// The upload form, with an inline error when the last submission was rejected
    pub fn form(&self, question: Option<&str>, error: Option<&str>) -> String {
        let mut html = String::from(
            "<form method=\"post\" action=\"/ask\" enctype=\"multipart/form-data\">\n\
             <p><span style=\"font-size: 20px;\">Submit a visual and let our AI assist with your home styling!</span></p>\n\
             <p><input type=\"file\" name=\"images\" accept=\".png,.jpg,.jpeg,image/png,image/jpeg\" multiple></p>\n",
        );
        let _ = writeln!(
            html,
            "<p><input type=\"text\" name=\"question\" size=\"60\" placeholder=\"Ask a question about the image(s)\" value=\"{}\">\n<button type=\"submit\">Ask</button></p>\n</form>",
            escape(question.unwrap_or_default())
        );
        if let Some(msg) = error {
            html.push_str(&error_block("Error:", msg));
        }
        html
    }

    /// One column per image, the last upload labeled "Image 1"
    pub fn previews(&self, images: &[EncodedImage]) -> String {
        let mut html = String::from("<div class=\"previews\">\n");
        for (i, image) in images.iter().enumerate() {
            let label = preview_label(i, images.len());
            let _ = writeln!(
                html,
                "<figure><p><strong>{label}</strong></p><img alt=\"{label}\" src=\"{}\"></figure>",
                image.data_uri()
            );
        }
        html.push_str("</div>\n<hr>\n");
        html
    }

    pub fn question(&self, query: &Query) -> String {
        format!(
            "<div class=\"question\">\n<h3>Your Question:</h3>\n<p style=\"font-size: 16px; font-weight: bold;\">{}</p>\n</div>\n",
            escape(query.as_str())
        )
    }

    pub fn spinner(&self) -> String {
        "<div id=\"spinner\" class=\"spinner-box\"><div class=\"spinner\"></div></div>\n".into()
    }

    pub fn response(&self, response: &ModelResponse) -> String {
        format!(
            "{SPINNER_DONE}\n<div class=\"response\">\n<h3>Response:</h3>\n<p style=\"font-size: 16px; white-space: pre-wrap;\">{}</p>\n</div>\n",
            escape(response.as_str())
        )
    }

    /// Shown in place of the response when the model could not answer
    pub fn failure(&self, message: &str) -> String {
        format!("{SPINNER_DONE}\n{}", error_block("The assistant could not answer:", message))
    }

    pub fn footer(&self) -> &'static str {
        "</body>\n</html>\n"
    }

    /// The whole page when there is nothing to ask about yet
    pub fn landing(&self, question: Option<&str>, error: Option<&str>) -> String {
        [
            self.header(),
            self.form(question, error),
            self.footer().to_string(),
        ]
        .concat()
    }
}

fn error_block(title: &str, message: &str) -> String {
    format!(
        "<div class=\"error\">\n<h3>{title}</h3>\n<p>{}</p>\n</div>\n",
        escape(message)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::test::{encoded, image_bytes};
    use crate::question::resolve;

    #[test]
    fn test_escape() {
        assert_eq!(
            escape(r#"<b>"Tom" & 'Jerry'</b>"#),
            "&lt;b&gt;&quot;Tom&quot; &amp; &#39;Jerry&#39;&lt;/b&gt;"
        );
    }

    #[test]
    fn test_preview_order() {
        let images = encoded(&[1, 2, 3]);
        let html = Page::default().previews(&images);

        let first = html.find(images[0].as_base64()).unwrap();
        let last = html.find(images[2].as_base64()).unwrap();
        let image3 = html.find("Image 3").unwrap();
        let image1 = html.find("Image 1").unwrap();
        assert!(first < last);
        assert!(image3 < first);
        assert!(image1 > first && image1 < last);
    }

    #[test]
    fn test_question_escaped() {
        let html = Page::default().question(&resolve(Some("<script>alert(1)</script>"), 1));
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn test_response_hides_spinner() {
        let page = Page::default();
        let html = page.response(&ModelResponse("Add a <rug>.".into()));
        assert!(html.starts_with(SPINNER_DONE));
        assert!(html.contains("Add a &lt;rug&gt;."));
        assert!(page.spinner().contains("id=\"spinner\""));
    }

    #[test]
    fn test_landing() {
        let html = Page::default().landing(None, Some("Please upload at most 4 images"));
        assert!(html.contains(TITLE));
        assert!(html.contains("enctype=\"multipart/form-data\""));
        assert!(html.contains("Please upload at most 4 images"));
        assert!(!html.contains("class=\"background\""));
        assert!(html.ends_with("</html>\n"));
    }

    #[test]
    fn test_background() {
        let path = std::env::temp_dir().join(format!("decor-bg-{}.png", std::process::id()));
        std::fs::write(&path, image_bytes(128, ImageOutputFormat::Png)).unwrap();

        let page = Page::load(&path);
        assert!(page.header().contains("<img class=\"background\" alt=\"\" src=\"data:image/png;base64,"));

        let missing = Page::load("/nonexistent/background.png");
        assert!(!missing.header().contains("class=\"background\""));
    }
}

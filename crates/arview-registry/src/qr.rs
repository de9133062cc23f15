//! QR rendering for viewer links. Pure: no storage access.

use std::io::Cursor;

use base64::Engine as _;
use image::{DynamicImage, ImageFormat, Luma};
use qrcode::QrCode;

use crate::error::RegistryError;

/// Smallest edge length of the rendered PNG, in pixels.
const MIN_DIMENSION: u32 = 256;

/// A rendered QR code.
#[derive(Debug, Clone)]
pub struct QrImage {
    /// PNG-encoded image.
    pub png: Vec<u8>,
}

impl QrImage {
    /// `data:image/png;base64,...`, ready for an `<img src>`.
    pub fn to_data_url(&self) -> String {
        format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&self.png)
        )
    }
}

/// Encode `target` as a QR code PNG.
pub fn render_qr(target: &str) -> Result<QrImage, RegistryError> {
    let code = QrCode::new(target.as_bytes()).map_err(|e| RegistryError::Qr(e.to_string()))?;
    let pixels = code
        .render::<Luma<u8>>()
        .min_dimensions(MIN_DIMENSION, MIN_DIMENSION)
        .build();

    let mut png = Vec::new();
    DynamicImage::ImageLuma8(pixels)
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| RegistryError::Qr(e.to_string()))?;
    Ok(QrImage { png })
}

/// Viewer page link for a model id, e.g. `https://host/viewer.html?id=abc`.
pub fn viewer_url(base: &str, id: &str) -> String {
    let page = format!("{}/viewer.html", base.trim_end_matches('/'));
    match reqwest::Url::parse(&page) {
        Ok(mut url) => {
            url.query_pairs_mut().append_pair("id", id);
            String::from(url)
        }
        Err(_) => format!("{page}?id={id}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    #[test]
    fn renders_png() {
        let qr = render_qr("https://example.com/viewer.html?id=abc").unwrap();
        assert!(qr.png.starts_with(PNG_MAGIC));
        let decoded = image::load_from_memory(&qr.png).unwrap();
        assert!(decoded.width() >= MIN_DIMENSION);
    }

    #[test]
    fn data_url_prefix() {
        let qr = render_qr("hello").unwrap();
        assert!(qr.to_data_url().starts_with("data:image/png;base64,iVBOR"));
    }

    #[test]
    fn oversized_payload_is_an_error() {
        let huge = "x".repeat(8000);
        assert!(matches!(render_qr(&huge), Err(RegistryError::Qr(_))));
    }

    #[test]
    fn viewer_url_joins_and_escapes() {
        assert_eq!(
            viewer_url("http://localhost:3000/", "abc-123"),
            "http://localhost:3000/viewer.html?id=abc-123"
        );
        assert_eq!(
            viewer_url("https://h", "a b&c"),
            "https://h/viewer.html?id=a+b%26c"
        );
    }
}

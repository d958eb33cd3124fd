//! Pairing QR display.

use {qrcode::QrCode, tracing::info};

/// Shows a pairing QR code to the operator.
pub trait QrRenderer: Send + Sync {
    fn render(&self, code: &str);
}

/// Prints the QR code to stderr as Unicode half blocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalQrRenderer;

impl QrRenderer for TerminalQrRenderer {
    fn render(&self, code: &str) {
        match render_unicode(code) {
            Some(art) => {
                info!("scan this QR code in WhatsApp (Linked devices > Link a device)");
                eprintln!("\n{art}");
            },
            None => info!(code, "pairing code too large to draw, scan it from another tool"),
        }
    }
}

/// Logs the raw pairing string only; for headless or JSON-logging runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogQrRenderer;

impl QrRenderer for LogQrRenderer {
    fn render(&self, code: &str) {
        info!(code, "pairing QR code received");
    }
}

/// Two module rows per text line: `▀` top only, `▄` bottom only.
pub fn render_unicode(data: &str) -> Option<String> {
    let code = QrCode::new(data.as_bytes()).ok()?;
    let width = code.width();
    let modules = code.to_colors();
    let dark = |x: usize, y: usize| y < width && modules[y * width + x] == qrcode::Color::Dark;

    let mut out = String::with_capacity((width + 3) * width.div_ceil(2));
    for y in (0..width).step_by(2) {
        out.push_str("  ");
        for x in 0..width {
            out.push(match (dark(x, y), dark(x, y + 1)) {
                (true, true) => '█',
                (true, false) => '▀',
                (false, true) => '▄',
                (false, false) => ' ',
            });
        }
        out.push('\n');
    }
    Some(out)
}

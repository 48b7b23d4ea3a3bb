// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Terminal rendering of provisioning codes.

use qrcode::QrCode;
use qrcode::render::unicode::Dense1x2;

use switchboard_core::SwitchboardError;

/// Renders `code` as a QR symbol made of half-block characters.
pub fn render_terminal(code: &str) -> Result<String, SwitchboardError> {
    let qr = QrCode::new(code.as_bytes())
        .map_err(|e| SwitchboardError::Internal(format!("failed to encode QR code: {e}")))?;
    Ok(qr
        .render::<Dense1x2>()
        .dark_color(Dense1x2::Light)
        .light_color(Dense1x2::Dark)
        .build())
}

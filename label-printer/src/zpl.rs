//! ZPL command builder
//!
//! Provides a fluent API for building ZPL label data, plus the fixed
//! box label layout used for split units.

use crate::error::{LabelError, LabelResult};
use tracing::instrument;

/// Left margin of every field, in dots
const MARGIN_X: u32 = 50;
/// Barcode module width and bar height, in dots
const BARCODE_MODULE: u32 = 3;
const BARCODE_HEIGHT: u32 = 80;

/// ZPL command builder
///
/// Builds a single `^XA .. ^XZ` label. Text is sent as UTF-8 (`^CI28`),
/// field data containing ZPL control characters is hex-escaped.
pub struct ZplBuilder {
    buf: String,
}

impl ZplBuilder {
    /// Start a new label
    pub fn new() -> Self {
        let mut buf = String::with_capacity(512);
        buf.push_str("^XA\n");
        // UTF-8 field data
        buf.push_str("^CI28\n");
        Self { buf }
    }

    /// Human-readable text field at (x, y) with a square scalable font
    pub fn text(&mut self, x: u32, y: u32, size: u32, s: &str) -> &mut Self {
        self.buf
            .push_str(&format!("^FO{},{}^A0N,{},{}", x, y, size, size));
        self.field_data(s);
        self
    }

    /// Code 128 barcode at (x, y) with interpretation line printed below
    pub fn barcode(&mut self, x: u32, y: u32, data: &str) -> &mut Self {
        self.buf.push_str(&format!(
            "^FO{},{}^BY{},2,{}\n",
            x, y, BARCODE_MODULE, BARCODE_HEIGHT
        ));
        self.buf
            .push_str(&format!("^BCN,{},Y,N,N,A", BARCODE_HEIGHT));
        self.field_data(data);
        self
    }

    fn field_data(&mut self, s: &str) {
        if s.contains(['^', '~', '_']) {
            // ^FH switches on hex escapes with '_' as the indicator
            self.buf.push_str("^FH_^FD");
            for c in s.chars() {
                match c {
                    '^' => self.buf.push_str("_5E"),
                    '~' => self.buf.push_str("_7E"),
                    '_' => self.buf.push_str("_5F"),
                    other => self.buf.push(other),
                }
            }
        } else {
            self.buf.push_str("^FD");
            self.buf.push_str(s);
        }
        self.buf.push_str("^FS\n");
    }

    /// Finish the label and return the command bytes
    pub fn build(mut self) -> Vec<u8> {
        self.buf.push_str("^XZ\n");
        self.buf.into_bytes()
    }
}

impl Default for ZplBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a quantity for printing
///
/// Shortest decimal that parses back to the same value, so the label
/// always matches the stored quantity. Whole numbers print without decimals.
pub fn format_quantity(quantity: f64) -> String {
    quantity.to_string()
}

/// Encode the box label for one split unit
///
/// Layout, top to bottom: product (title text, code text, barcode),
/// quantity (text, barcode), batch (text, barcode).
#[instrument(level = "debug", skip_all, fields(batch_id = %batch_id))]
pub fn encode_label(item_code: &str, quantity: f64, batch_id: &str) -> LabelResult<Vec<u8>> {
    if item_code.trim().is_empty() {
        return Err(LabelError::InvalidLabelInput("item code"));
    }
    if !quantity.is_finite() {
        return Err(LabelError::InvalidLabelInput("quantity"));
    }
    if batch_id.trim().is_empty() {
        return Err(LabelError::InvalidLabelInput("batch id"));
    }

    let qty = format_quantity(quantity);

    let mut b = ZplBuilder::new();
    b.text(MARGIN_X, 50, 45, &format!("Prodotto: {}", item_code))
        .text(MARGIN_X, 120, 35, &format!("Codice: {}", item_code))
        .barcode(MARGIN_X, 180, item_code)
        .text(MARGIN_X, 300, 35, &format!("Quantità: {}", qty))
        .barcode(MARGIN_X, 350, &qty)
        .text(MARGIN_X, 470, 35, &format!("Lotto: {}", batch_id))
        .barcode(MARGIN_X, 520, batch_id);

    Ok(b.build())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_text(data: &[u8]) -> String {
        String::from_utf8(data.to_vec()).unwrap()
    }

    #[test]
    fn test_label_frame() {
        let s = as_text(&encode_label("ART-1", 40.0, "HU123").unwrap());
        assert!(s.starts_with("^XA\n^CI28\n"));
        assert!(s.ends_with("^XZ\n"));
    }

    #[test]
    fn test_fields_in_order() {
        let s = as_text(&encode_label("ART-1", 35.0, "HU123-1").unwrap());

        let product = s.find("^FDProdotto: ART-1^FS").unwrap();
        let product_bc = s.find("^BCN,80,Y,N,N,A^FDART-1^FS").unwrap();
        let qty = s.find("^FDQuantità: 35^FS").unwrap();
        let qty_bc = s.find("^BCN,80,Y,N,N,A^FD35^FS").unwrap();
        let batch = s.find("^FDLotto: HU123-1^FS").unwrap();
        let batch_bc = s.find("^BCN,80,Y,N,N,A^FDHU123-1^FS").unwrap();

        assert!(product < product_bc);
        assert!(product_bc < qty);
        assert!(qty < qty_bc);
        assert!(qty_bc < batch);
        assert!(batch < batch_bc);
    }

    #[test]
    fn test_deterministic() {
        let a = encode_label("ART-1", 12.5, "HU9").unwrap();
        let b = encode_label("ART-1", 12.5, "HU9").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_inputs_rejected() {
        assert_eq!(
            encode_label("", 1.0, "HU1"),
            Err(LabelError::InvalidLabelInput("item code"))
        );
        assert_eq!(
            encode_label("ART", f64::NAN, "HU1"),
            Err(LabelError::InvalidLabelInput("quantity"))
        );
        assert_eq!(
            encode_label("ART", 1.0, "  "),
            Err(LabelError::InvalidLabelInput("batch id"))
        );
    }

    #[test]
    fn test_control_chars_escaped() {
        let s = as_text(&encode_label("A^B~C_D", 1.0, "HU1").unwrap());
        assert!(s.contains("^FH_^FDProdotto: A_5EB_7EC_5FD^FS"));
        assert!(!s.contains("A^B"));
    }

    #[test]
    fn test_format_quantity() {
        assert_eq!(format_quantity(40.0), "40");
        assert_eq!(format_quantity(12.5), "12.5");
        assert_eq!(format_quantity(33.3333), "33.3333");
        assert_eq!(format_quantity(12.3456), "12.3456");
        assert_eq!(format_quantity(0.0004), "0.0004");
    }

    #[test]
    fn test_printed_quantity_round_trips() {
        for q in [12.3456, 0.0004, 1.0 / 3.0, 0.1 + 0.2, 99.99] {
            assert_eq!(format_quantity(q).parse::<f64>().unwrap(), q);
        }

        let s = as_text(&encode_label("ART-1", 0.0004, "HU1").unwrap());
        assert!(s.contains("^FDQuantità: 0.0004^FS"));
        assert!(s.contains("^BCN,80,Y,N,N,A^FD0.0004^FS"));
    }
}

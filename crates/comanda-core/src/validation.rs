//! # Validation Module
//!
//! Input checks that need no database, run before a transaction opens so a
//! bad request never takes a lock.
//!
//! ## Usage
//! ```rust
//! use comanda_core::types::OrderKind;
//! use comanda_core::validation::{validate_order_fields, OrderFields};
//!
//! let fields = OrderFields {
//!     kind: OrderKind::Delivery,
//!     table_id: None,
//!     customer_name: Some("Ana"),
//!     customer_phone: None,
//!     customer_address: Some("Calle 1"),
//! };
//! let err = validate_order_fields(&fields).unwrap_err();
//! assert_eq!(err.to_string(), "el teléfono del cliente es obligatorio");
//! ```

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::OrderKind;

pub type ValidationResult<T> = Result<T, ValidationError>;

/// Maximum length of free-text fields (notes, concepts, reasons).
pub const MAX_TEXT_LEN: usize = 500;

/// Kind-specific order header fields, borrowed from whatever holds them.
#[derive(Debug, Clone, Copy)]
pub struct OrderFields<'a> {
    pub kind: OrderKind,
    pub table_id: Option<&'a str>,
    pub customer_name: Option<&'a str>,
    pub customer_phone: Option<&'a str>,
    pub customer_address: Option<&'a str>,
}

fn present(value: Option<&str>) -> bool {
    value.map(|v| !v.trim().is_empty()).unwrap_or(false)
}

/// DOMICILIO needs customer name, phone and address; MESA needs a table.
pub fn validate_order_fields(fields: &OrderFields<'_>) -> ValidationResult<()> {
    match fields.kind {
        OrderKind::Delivery => {
            if !present(fields.customer_name) {
                return Err(ValidationError::Required {
                    field: "el nombre del cliente",
                });
            }
            if !present(fields.customer_phone) {
                return Err(ValidationError::Required {
                    field: "el teléfono del cliente",
                });
            }
            if !present(fields.customer_address) {
                return Err(ValidationError::Required {
                    field: "el domicilio del cliente",
                });
            }
        }
        OrderKind::Table => {
            if !present(fields.table_id) {
                return Err(ValidationError::Required {
                    field: "el identificador de mesa",
                });
            }
        }
        OrderKind::Takeaway => {}
    }
    Ok(())
}

/// Amounts moved through the ledger must be strictly positive.
pub fn validate_positive(field: &'static str, amount: Money) -> ValidationResult<()> {
    if !amount.is_positive() {
        return Err(ValidationError::MustBePositive { field });
    }
    Ok(())
}

/// Discounts, taxes and tips may be zero but never negative.
pub fn validate_non_negative(field: &'static str, amount: Money) -> ValidationResult<()> {
    if amount.is_negative() {
        return Err(ValidationError::InvalidFormat {
            field,
            reason: "no puede ser negativo".to_string(),
        });
    }
    Ok(())
}

/// Non-blank text within [`MAX_TEXT_LEN`].
pub fn validate_text(field: &'static str, text: &str) -> ValidationResult<()> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ValidationError::Required { field });
    }
    validate_optional_text(field, Some(text))
}

pub fn validate_optional_text(field: &'static str, text: Option<&str>) -> ValidationResult<()> {
    match text {
        Some(t) if t.chars().count() > MAX_TEXT_LEN => Err(ValidationError::TooLong {
            field,
            max: MAX_TEXT_LEN,
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delivery<'a>(
        name: Option<&'a str>,
        phone: Option<&'a str>,
        address: Option<&'a str>,
    ) -> OrderFields<'a> {
        OrderFields {
            kind: OrderKind::Delivery,
            table_id: None,
            customer_name: name,
            customer_phone: phone,
            customer_address: address,
        }
    }

    #[test]
    fn test_delivery_requires_customer_fields() {
        assert!(validate_order_fields(&delivery(Some("Ana"), Some("300"), Some("Cra 7"))).is_ok());
        let err = validate_order_fields(&delivery(Some("Ana"), Some("  "), Some("Cra 7")))
            .unwrap_err();
        assert_eq!(err.to_string(), "el teléfono del cliente es obligatorio");
        assert!(validate_order_fields(&delivery(None, Some("300"), Some("x"))).is_err());
        assert!(validate_order_fields(&delivery(Some("Ana"), Some("300"), None)).is_err());
    }

    #[test]
    fn test_table_requires_table_id() {
        let mut fields = OrderFields {
            kind: OrderKind::Table,
            table_id: None,
            customer_name: None,
            customer_phone: None,
            customer_address: None,
        };
        assert!(validate_order_fields(&fields).is_err());
        fields.table_id = Some("m1");
        assert!(validate_order_fields(&fields).is_ok());
        fields.kind = OrderKind::Takeaway;
        fields.table_id = None;
        assert!(validate_order_fields(&fields).is_ok());
    }

    #[test]
    fn test_amounts_and_text() {
        assert!(validate_positive("monto", Money::zero()).is_err());
        assert!(validate_positive("monto", Money::from_cents(1)).is_ok());
        assert!(validate_non_negative("propina", Money::zero()).is_ok());
        assert!(validate_non_negative("propina", Money::from_cents(-1)).is_err());
        assert!(validate_text("concepto", "   ").is_err());
        assert!(validate_text("concepto", &"x".repeat(MAX_TEXT_LEN + 1)).is_err());
        assert!(validate_text("concepto", "Hielo").is_ok());
    }
}

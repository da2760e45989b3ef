//! Ingredient consumption check for closing an order.

use crate::error::{CoreError, CoreResult};
use crate::types::IngredientRequirement;

/// Tolerance for REAL stock arithmetic.
const STOCK_EPSILON: f64 = 1e-9;

/// Fails on the first ingredient whose stock does not cover the demand.
pub fn ensure_stock(requirements: &[IngredientRequirement]) -> CoreResult<()> {
    for req in requirements {
        if req.required > req.available + STOCK_EPSILON {
            return Err(CoreError::InsufficientStock {
                ingredient: req.name.clone(),
                required: req.required,
                available: req.available,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(name: &str, required: f64, available: f64) -> IngredientRequirement {
        IngredientRequirement {
            ingredient_id: name.to_lowercase(),
            name: name.into(),
            required,
            available,
        }
    }

    #[test]
    fn test_exact_stock_is_enough() {
        assert!(ensure_stock(&[req("Pan", 2.0, 2.0), req("Carne", 0.3, 1.0)]).is_ok());
    }

    #[test]
    fn test_names_short_ingredient() {
        let err = ensure_stock(&[req("Pan", 1.0, 5.0), req("Queso", 0.4, 0.1)]).unwrap_err();
        match err {
            CoreError::InsufficientStock {
                ingredient,
                required,
                available,
            } => {
                assert_eq!(ingredient, "Queso");
                assert_eq!(required, 0.4);
                assert_eq!(available, 0.1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}

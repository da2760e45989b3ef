//! # Cash Reconciliation
//!
//! Pure arithmetic behind a shift close.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  window invoices ──► InvoiceTotals (gross, discounts, taxes, tips, net) │
//! │                                                                         │
//! │  window payments ──► per invoice: apportion tip by payment base        │
//! │                      (largest remainder, shares sum exactly to tip)    │
//! │                  ──► bucket base + tip share: cash / card / other      │
//! │                                                                         │
//! │  expected = opening + cash + extra income − expenses                    │
//! │  difference = counted − expected                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything is integer minor units, so no aggregate can become NaN.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::types::{CashShift, Invoice};

// =============================================================================
// Buckets
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentBucket {
    Cash,
    Card,
    Other,
}

/// Classifies a payment by its bank account's payment method.
///
/// `method` is `(name, is_cash)`; `None` when the payment has no account.
pub fn bucket_for(method: Option<(&str, bool)>) -> PaymentBucket {
    match method {
        Some((_, true)) => PaymentBucket::Cash,
        Some((name, false)) if name.to_uppercase().contains("TARJETA") => PaymentBucket::Card,
        _ => PaymentBucket::Other,
    }
}

/// A payment as the reconciliation sees it.
#[derive(Debug, Clone)]
pub struct LedgerPayment {
    pub invoice_id: String,
    pub base: Money,
    pub bucket: PaymentBucket,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PaymentTotals {
    pub cash: Money,
    pub card: Money,
    pub other: Money,
}

impl PaymentTotals {
    pub fn total(&self) -> Money {
        self.cash + self.card + self.other
    }

    fn add(&mut self, bucket: PaymentBucket, amount: Money) {
        match bucket {
            PaymentBucket::Cash => self.cash += amount,
            PaymentBucket::Card => self.card += amount,
            PaymentBucket::Other => self.other += amount,
        }
    }
}

// =============================================================================
// Tip Apportionment
// =============================================================================

/// Splits `tip` across payments proportionally to `bases`.
///
/// Shares are floored and the leftover minor units go to the largest
/// fractional remainders (earliest payment wins ties), so the result always
/// sums to `tip`. When the bases sum to zero or less, the whole tip goes to
/// the first payment.
pub fn apportion_tip(tip: Money, bases: &[Money]) -> Vec<Money> {
    if bases.is_empty() {
        return Vec::new();
    }
    let total: i128 = bases.iter().map(|b| i128::from(b.cents().max(0))).sum();
    if total <= 0 {
        let mut shares = vec![Money::zero(); bases.len()];
        shares[0] = tip;
        return shares;
    }

    let tip_cents = i128::from(tip.cents());
    let mut shares: Vec<i128> = Vec::with_capacity(bases.len());
    let mut remainders: Vec<(i128, usize)> = Vec::with_capacity(bases.len());
    for (idx, base) in bases.iter().enumerate() {
        let scaled = tip_cents * i128::from(base.cents().max(0));
        shares.push(scaled.div_euclid(total));
        remainders.push((scaled.rem_euclid(total), idx));
    }

    let assigned: i128 = shares.iter().sum();
    let mut leftover = tip_cents - assigned;
    remainders.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    for (_, idx) in remainders.iter().cycle() {
        if leftover <= 0 {
            break;
        }
        shares[*idx] += 1;
        leftover -= 1;
    }

    shares
        .into_iter()
        .map(|c| Money::from_cents(i64::try_from(c).unwrap_or(i64::MAX)))
        .collect()
}

/// Buckets every payment's base plus its tip share.
pub fn tally_payments(invoices: &[Invoice], payments: &[LedgerPayment]) -> PaymentTotals {
    let mut by_invoice: BTreeMap<&str, Vec<&LedgerPayment>> = BTreeMap::new();
    for payment in payments {
        by_invoice
            .entry(payment.invoice_id.as_str())
            .or_default()
            .push(payment);
    }

    let tips: BTreeMap<&str, Money> = invoices.iter().map(|i| (i.id.as_str(), i.tip)).collect();
    let mut totals = PaymentTotals::default();
    for (invoice_id, group) in by_invoice {
        let tip = tips.get(invoice_id).copied().unwrap_or_default();
        let bases: Vec<Money> = group.iter().map(|p| p.base).collect();
        let shares = apportion_tip(tip, &bases);
        for (payment, share) in group.iter().zip(shares) {
            totals.add(payment.bucket, payment.base + share);
        }
    }
    totals
}

// =============================================================================
// Invoice Totals
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InvoiceTotals {
    pub gross_sales: Money,
    pub discounts: Money,
    pub taxes: Money,
    pub tips: Money,
    pub net_sales: Money,
}

pub fn sum_invoices(invoices: &[Invoice]) -> InvoiceTotals {
    invoices
        .iter()
        .fold(InvoiceTotals::default(), |mut acc, inv| {
            acc.gross_sales += inv.subtotal;
            acc.discounts += inv.discount;
            acc.taxes += inv.tax;
            acc.tips += inv.tip;
            acc.net_sales += inv.subtotal - inv.discount;
            acc
        })
}

// =============================================================================
// Shift Summary
// =============================================================================

/// Everything a shift close persists, computed from raw rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ShiftSummary {
    pub invoices: InvoiceTotals,
    pub payments: PaymentTotals,
    pub expenses: Money,
    pub extra_income: Money,
}

impl ShiftSummary {
    pub fn compute(
        invoices: &[Invoice],
        payments: &[LedgerPayment],
        expenses: Money,
        extra_income: Money,
    ) -> Self {
        ShiftSummary {
            invoices: sum_invoices(invoices),
            payments: tally_payments(invoices, payments),
            expenses,
            extra_income,
        }
    }

    /// Cash the drawer should hold.
    pub fn expected_balance(&self, opening_balance: Money) -> Money {
        expected_balance(
            opening_balance,
            self.payments.cash,
            self.extra_income,
            self.expenses,
        )
    }

    /// Copies the aggregates onto a shift row.
    pub fn apply_to(&self, shift: &mut CashShift) {
        shift.gross_sales = self.invoices.gross_sales;
        shift.discounts = self.invoices.discounts;
        shift.taxes = self.invoices.taxes;
        shift.tips = self.invoices.tips;
        shift.net_sales = self.invoices.net_sales;
        shift.cash_payments = self.payments.cash;
        shift.card_payments = self.payments.card;
        shift.other_payments = self.payments.other;
        shift.total_collected = self.payments.total();
        shift.expenses = self.expenses;
        shift.extra_income = self.extra_income;
    }
}

/// `saldo_esperado = saldo_inicial + efectivo + ingresos_extra − gastos`
pub fn expected_balance(
    opening: Money,
    cash_received: Money,
    extra_income: Money,
    expenses: Money,
) -> Money {
    opening + cash_received + extra_income - expenses
}

/// `diferencia_caja = saldo_final_contado − saldo_esperado`
pub fn cash_difference(counted: Money, expected: Money) -> Money {
    counted - expected
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn invoice(id: &str, subtotal: i64, tip: i64) -> Invoice {
        Invoice {
            id: id.into(),
            tenant_id: "t".into(),
            cashier_id: "c".into(),
            subtotal: Money::from_cents(subtotal),
            discount: Money::zero(),
            tax: Money::zero(),
            tip: Money::from_cents(tip),
            total: Money::from_cents(subtotal + tip),
            cash_shift_id: None,
            created_at: Utc::now(),
        }
    }

    fn pay(invoice_id: &str, base: i64, bucket: PaymentBucket) -> LedgerPayment {
        LedgerPayment {
            invoice_id: invoice_id.into(),
            base: Money::from_cents(base),
            bucket,
        }
    }

    #[test]
    fn test_bucket_for() {
        assert_eq!(bucket_for(Some(("Efectivo", true))), PaymentBucket::Cash);
        assert_eq!(bucket_for(Some(("Tarjeta débito", false))), PaymentBucket::Card);
        assert_eq!(bucket_for(Some(("Nequi", false))), PaymentBucket::Other);
        assert_eq!(bucket_for(None), PaymentBucket::Other);
    }

    #[test]
    fn test_apportion_sums_exactly() {
        let bases = [Money::from_cents(100), Money::from_cents(100), Money::from_cents(100)];
        let shares = apportion_tip(Money::from_cents(100), &bases);
        let total: Money = shares.iter().sum();
        assert_eq!(total, Money::from_cents(100));
        assert_eq!(shares[0], Money::from_cents(34));
        assert_eq!(shares[1], Money::from_cents(33));
    }

    #[test]
    fn test_apportion_proportional() {
        let bases = [Money::from_cents(7500), Money::from_cents(2500)];
        let shares = apportion_tip(Money::from_cents(1000), &bases);
        assert_eq!(shares, vec![Money::from_cents(750), Money::from_cents(250)]);
    }

    #[test]
    fn test_apportion_zero_base() {
        let bases = [Money::zero(), Money::zero()];
        let shares = apportion_tip(Money::from_cents(500), &bases);
        assert_eq!(shares, vec![Money::from_cents(500), Money::zero()]);
        assert!(apportion_tip(Money::from_cents(5), &[]).is_empty());
    }

    #[test]
    fn test_single_cash_payment_carries_tip() {
        let invoices = [invoice("f1", 10_000, 1_000)];
        let payments = [pay("f1", 10_000, PaymentBucket::Cash)];
        let totals = tally_payments(&invoices, &payments);
        assert_eq!(totals.cash, Money::from_cents(11_000));
        assert_eq!(totals.total(), Money::from_cents(11_000));
    }

    #[test]
    fn test_split_payment_buckets() {
        let invoices = [invoice("f1", 10_000, 1_000)];
        let payments = [
            pay("f1", 6_000, PaymentBucket::Cash),
            pay("f1", 4_000, PaymentBucket::Card),
        ];
        let totals = tally_payments(&invoices, &payments);
        assert_eq!(totals.cash, Money::from_cents(6_600));
        assert_eq!(totals.card, Money::from_cents(4_400));
        assert_eq!(totals.other, Money::zero());
    }

    #[test]
    fn test_conservation() {
        let opening = Money::from_cents(50_000);
        let summary = ShiftSummary {
            payments: PaymentTotals {
                cash: Money::from_cents(11_000),
                ..Default::default()
            },
            expenses: Money::from_cents(2_000),
            extra_income: Money::from_cents(500),
            ..Default::default()
        };
        let expected = summary.expected_balance(opening);
        assert_eq!(expected, Money::from_cents(59_500));
        let counted = Money::from_cents(60_000);
        assert_eq!(cash_difference(counted, expected), Money::from_cents(500));
    }

    #[test]
    fn test_invoice_totals() {
        let mut inv = invoice("f1", 10_000, 1_000);
        inv.discount = Money::from_cents(500);
        inv.tax = Money::from_cents(800);
        let totals = sum_invoices(&[inv, invoice("f2", 2_000, 0)]);
        assert_eq!(totals.gross_sales, Money::from_cents(12_000));
        assert_eq!(totals.discounts, Money::from_cents(500));
        assert_eq!(totals.taxes, Money::from_cents(800));
        assert_eq!(totals.tips, Money::from_cents(1_000));
        assert_eq!(totals.net_sales, Money::from_cents(11_500));
    }
}

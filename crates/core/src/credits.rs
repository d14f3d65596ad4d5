//! Credit ledger vocabulary and the purchasable credit pack catalog.

use serde::Serialize;

use crate::error::CoreError;
use crate::types::JobId;

/// Credits consumed by one successfully completed paid generation.
pub const GENERATION_COST: i32 = 1;

// ---------------------------------------------------------------------------
// Ledger entry kinds
// ---------------------------------------------------------------------------

/// Kind of a credit ledger entry, stored as text in `credit_ledger_entries.kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerKind {
    Purchase,
    Generation,
    Adjustment,
}

impl LedgerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Purchase => "purchase",
            Self::Generation => "generation",
            Self::Adjustment => "adjustment",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, CoreError> {
        match name {
            "purchase" => Ok(Self::Purchase),
            "generation" => Ok(Self::Generation),
            "adjustment" => Ok(Self::Adjustment),
            other => Err(CoreError::Validation(format!(
                "Unknown ledger entry kind '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Idempotency keys
// ---------------------------------------------------------------------------
//
// All entry kinds share one unique column, so keys are namespaced by kind.

/// Key guarding the single debit for a completed paid job.
pub fn generation_key(job_id: JobId) -> String {
    format!("generation:{job_id}")
}

/// Key guarding the single credit for a confirmed payment session.
pub fn purchase_key(session_id: &str) -> String {
    format!("purchase:{session_id}")
}

/// Key guarding a manual balance adjustment.
pub fn adjustment_key(reference: &str) -> String {
    format!("adjustment:{reference}")
}

// ---------------------------------------------------------------------------
// Credit packs
// ---------------------------------------------------------------------------

/// A purchasable bundle of credits. Prices are in minor currency units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CreditPack {
    pub id: &'static str,
    pub name: &'static str,
    pub credits: i32,
    pub price_per_credit_cents: i64,
    pub total_price_cents: i64,
}

/// The catalog, cheapest first.
pub const CREDIT_PACKS: &[CreditPack] = &[
    CreditPack {
        id: "starter",
        name: "Starter",
        credits: 5,
        price_per_credit_cents: 99,
        total_price_cents: 495,
    },
    CreditPack {
        id: "standard",
        name: "Standard",
        credits: 15,
        price_per_credit_cents: 89,
        total_price_cents: 1335,
    },
    CreditPack {
        id: "pro",
        name: "Pro",
        credits: 40,
        price_per_credit_cents: 79,
        total_price_cents: 3160,
    },
    CreditPack {
        id: "power",
        name: "Power",
        credits: 100,
        price_per_credit_cents: 69,
        total_price_cents: 6900,
    },
];

/// Look up a pack by id.
pub fn find_pack(pack_id: &str) -> Result<&'static CreditPack, CoreError> {
    CREDIT_PACKS
        .iter()
        .find(|p| p.id == pack_id)
        .ok_or_else(|| CoreError::Validation(format!("Invalid pack_id '{pack_id}'")))
}

/// Admission check for a paid generation.
pub fn ensure_can_afford(balance: i32) -> Result<(), CoreError> {
    if balance < GENERATION_COST {
        return Err(CoreError::InsufficientCredit { balance });
    }
    Ok(())
}

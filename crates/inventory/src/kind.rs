use core::str::FromStr;

use serde::{Deserialize, Serialize};

use retailerp_core::DomainError;

/// Why a ledger entry exists.
///
/// Closed set: every place that derives an effect direction from the kind
/// matches exhaustively, so adding a kind is a compile-checked change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Sale,
    SaleEdit,
    SaleDelete,
    Return,
    Shipment,
    Transfer,
    Restock,
    Production,
    Adjust,
}

impl TransactionKind {
    pub const ALL: [TransactionKind; 9] = [
        TransactionKind::Sale,
        TransactionKind::SaleEdit,
        TransactionKind::SaleDelete,
        TransactionKind::Return,
        TransactionKind::Shipment,
        TransactionKind::Transfer,
        TransactionKind::Restock,
        TransactionKind::Production,
        TransactionKind::Adjust,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Sale => "SALE",
            TransactionKind::SaleEdit => "SALE_EDIT",
            TransactionKind::SaleDelete => "SALE_DELETE",
            TransactionKind::Return => "RETURN",
            TransactionKind::Shipment => "SHIPMENT",
            TransactionKind::Transfer => "TRANSFER",
            TransactionKind::Restock => "RESTOCK",
            TransactionKind::Production => "PRODUCTION",
            TransactionKind::Adjust => "ADJUST",
        }
    }
}

impl core::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransactionKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| DomainError::validation(format!("unknown transaction kind '{s}'")))
    }
}

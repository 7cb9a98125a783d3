//! Transaction domains.
//!
//! Each domain module owns a column [`Schema`], a `prepare` step that loads
//! the input and adds derived columns, and a [`Registry`] of its analyses in
//! report order.

pub mod customers;
pub mod ledger;
pub mod payments;
pub mod refunds;
pub mod sales;

use crate::analysis::Registry;
use crate::dataset::{Dataset, Input, Schema};
use crate::error::LedgerError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported transaction domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Payments,
    Refunds,
    Customers,
    Sales,
    Ledger,
}

impl Domain {
    pub const ALL: [Domain; 5] = [
        Domain::Payments,
        Domain::Refunds,
        Domain::Customers,
        Domain::Sales,
        Domain::Ledger,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Domain::Payments => "payments",
            Domain::Refunds => "refunds",
            Domain::Customers => "customers",
            Domain::Sales => "sales",
            Domain::Ledger => "ledger",
        }
    }

    pub fn schema(self) -> Schema {
        match self {
            Domain::Payments => payments::schema(),
            Domain::Refunds => refunds::schema(),
            Domain::Customers => customers::schema(),
            Domain::Sales => sales::schema(),
            Domain::Ledger => ledger::schema(),
        }
    }

    /// Load and validate the input, then compute the domain's derived columns.
    pub fn prepare(self, input: Input) -> Result<Dataset, LedgerError> {
        match self {
            Domain::Payments => payments::prepare(input),
            Domain::Refunds => refunds::prepare(input),
            Domain::Customers => customers::prepare(input),
            Domain::Sales => sales::prepare(input),
            Domain::Ledger => ledger::prepare(input),
        }
    }

    pub fn registry(self) -> Registry {
        match self {
            Domain::Payments => payments::registry(),
            Domain::Refunds => refunds::registry(),
            Domain::Customers => customers::registry(),
            Domain::Sales => sales::registry(),
            Domain::Ledger => ledger::registry(),
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Domain {
    type Err = LedgerError;

    /// Accepts the domain names plus the module names used by older configs
    /// (`customer`, `account_summary`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "payments" | "payment" => Ok(Domain::Payments),
            "refunds" | "refund" => Ok(Domain::Refunds),
            "customers" | "customer" => Ok(Domain::Customers),
            "sales" => Ok(Domain::Sales),
            "ledger" | "account_summary" => Ok(Domain::Ledger),
            _ => Err(LedgerError::UnknownDomain(s.to_string())),
        }
    }
}

/// Case-insensitive substring match on an event type.
pub(crate) fn matches_event(event: &str, needle: &str) -> bool {
    event.to_lowercase().contains(needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_from_str() {
        assert_eq!("payments".parse::<Domain>().unwrap(), Domain::Payments);
        assert_eq!("Customer".parse::<Domain>().unwrap(), Domain::Customers);
        assert_eq!("account_summary".parse::<Domain>().unwrap(), Domain::Ledger);
        assert!(matches!(
            "inventory".parse::<Domain>(),
            Err(LedgerError::UnknownDomain(ref s)) if s == "inventory"
        ));
    }

    #[test]
    fn test_every_domain_has_a_registry() {
        for domain in Domain::ALL {
            assert!(!domain.registry().is_empty(), "{} has no analyses", domain);
            assert!(!domain.schema().columns.is_empty());
            assert_eq!(domain.name().parse::<Domain>().unwrap(), domain);
        }
        assert_eq!(Domain::Ledger.registry().len(), 13);
        assert_eq!(Domain::Payments.registry().len(), 10);
        assert_eq!(Domain::Refunds.registry().len(), 10);
        assert_eq!(Domain::Customers.registry().len(), 11);
        assert_eq!(Domain::Sales.registry().len(), 6);
    }

    #[test]
    fn test_missing_required_column_is_fatal() {
        let table = crate::dataset::tests::raw(&["Product Name"], &[&["x"]]);
        let err = Domain::Sales.prepare(Input::table(table)).unwrap_err();
        assert!(matches!(err, LedgerError::MissingColumn { .. }));
    }

    #[test]
    fn test_matches_event() {
        assert!(matches_event("Refund_Reversal", "refund"));
        assert!(matches_event("payment_fee", "fee"));
        assert!(!matches_event("payment", "tax"));
    }
}

//! Application services.
//!
//! Pure orchestration over the `PaymentStore` and `PaymentGateway` ports; no
//! wire or storage detail lives here.

pub mod ledger;
pub mod reconciler;
pub mod registry;

pub use ledger::TransactionLedger;
pub use reconciler::{ChargeRequest, Reconciler, SingleBuyRequest};
pub use registry::{CardRegistry, EnrollmentDefaults, EnrollmentRequest};

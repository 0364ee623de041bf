//! Business services: sale lifecycle, checkout and purchase coordination,
//! the deterministic item catalog, and the hourly scheduler.

pub mod checkout;
pub mod items;
pub mod purchase;
pub mod sales;
pub mod scheduler;

pub use checkout::{CheckoutGrant, CheckoutService};
pub use items::ItemCatalog;
pub use purchase::{PurchaseReceipt, PurchaseService};
pub use sales::SaleService;
pub use scheduler::{SaleScheduler, SchedulerHandle};

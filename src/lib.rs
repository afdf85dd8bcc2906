pub mod auction;
pub mod bidding;
pub mod clock;
pub mod error;
pub mod facade;
pub mod handlers;
pub mod increment;
pub mod inventory;
pub mod ledger;
pub mod notifier;
pub mod offers;
pub mod query;
pub mod scheduler;

pub mod community;
pub mod experience;
pub mod ledger;
pub mod link;
pub mod marker;

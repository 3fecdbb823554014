pub mod deals;
pub mod feed;
pub mod kyc;
pub mod loyalty;
pub mod negotiation;
pub mod orders;
pub mod rewards;
pub mod tracking;
pub mod voice;

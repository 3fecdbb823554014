pub mod bid;
pub mod change;
pub mod deal;
pub mod identity;
pub mod kyc;
pub mod loyalty;
pub mod negotiation;
pub mod order;
pub mod rating;
pub mod tracking;

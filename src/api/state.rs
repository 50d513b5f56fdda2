use std::sync::Arc;

use crate::checkout::Checkout;
use crate::config::Config;
use crate::crypto::SessionIssuer;
use crate::ledger::PaymentOracle;
use crate::models::{ProductDb, PurchaseDb, UserService};

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserService>,
    pub products: Arc<dyn ProductDb>,
    pub purchases: Arc<dyn PurchaseDb>,
    pub checkout: Arc<Checkout>,
    pub sessions: Arc<SessionIssuer>,
    pub ledger: Arc<dyn PaymentOracle>,
    pub config: Arc<Config>,
    /// Ledger address that receives every payment.
    pub store_wallet: String,
}

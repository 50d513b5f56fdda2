//! Reqwest-backed ledger gateway client.
//!
//! Speaks a small JSON API in front of the payment network:
//!
//! | Method | Path | Body | Response |
//! |--------|------|------|----------|
//! | POST | `/accounts` | - | `{address, secret}` |
//! | GET | `/accounts/{address}` | - | `{address, balance}` |
//! | POST | `/transfers` | `{source_secret, destination, amount}` | `{reference}` |

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};

use super::{OracleError, PaymentOracle, TransferReceipt};
use crate::error::AppError;
use crate::models::Wallet;

pub struct HttpLedger {
    client: Client,
    base_url: Url,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    balance: u64,
}

#[derive(Debug, Serialize)]
struct TransferRequest<'a> {
    source_secret: &'a str,
    destination: &'a str,
    amount: u64,
}

impl HttpLedger {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        let mut raw = base_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let base_url = Url::parse(&raw)
            .map_err(|e| AppError::Config(format!("Invalid LEDGER_URL: {}", e)))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build ledger client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, OracleError> {
        self.base_url
            .join(path)
            .map_err(|e| OracleError::Rejected(format!("bad ledger path {}: {}", path, e)))
    }

    fn map_transport_error(&self, error: reqwest::Error) -> OracleError {
        if error.is_timeout() {
            OracleError::Timeout(self.timeout)
        } else {
            OracleError::Unavailable(error.to_string())
        }
    }

    async fn decode<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
        subject: &str,
    ) -> Result<T, OracleError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status_error(status, subject, &body));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| OracleError::Unavailable(format!("invalid ledger payload: {}", e)))
    }
}

fn map_status_error(status: StatusCode, subject: &str, body: &str) -> OracleError {
    match status {
        StatusCode::PAYMENT_REQUIRED | StatusCode::CONFLICT => OracleError::InsufficientFunds,
        StatusCode::NOT_FOUND => OracleError::UnknownAccount(subject.to_string()),
        _ if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS => {
            OracleError::Unavailable(format!("status {}", status.as_u16()))
        }
        _ => OracleError::Rejected(format!("status {}: {}", status.as_u16(), body)),
    }
}

#[async_trait]
impl PaymentOracle for HttpLedger {
    async fn open_account(&self) -> Result<Wallet, OracleError> {
        let response = self
            .client
            .post(self.endpoint("accounts")?)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        self.decode(response, "new account").await
    }

    async fn balance(&self, address: &str) -> Result<u64, OracleError> {
        let response = self
            .client
            .get(self.endpoint(&format!("accounts/{}", address))?)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let account: AccountResponse = self.decode(response, address).await?;
        Ok(account.balance)
    }

    async fn transfer(
        &self,
        source_secret: &str,
        destination: &str,
        amount: u64,
    ) -> Result<TransferReceipt, OracleError> {
        let response = self
            .client
            .post(self.endpoint("transfers")?)
            .json(&TransferRequest {
                source_secret,
                destination,
                amount,
            })
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        self.decode(response, destination).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            map_status_error(StatusCode::PAYMENT_REQUIRED, "G1", ""),
            OracleError::InsufficientFunds
        );
        assert_eq!(
            map_status_error(StatusCode::NOT_FOUND, "G1", ""),
            OracleError::UnknownAccount("G1".to_string())
        );
        assert!(matches!(
            map_status_error(StatusCode::BAD_GATEWAY, "G1", ""),
            OracleError::Unavailable(_)
        ));
        assert!(matches!(
            map_status_error(StatusCode::BAD_REQUEST, "G1", "bad amount"),
            OracleError::Rejected(msg) if msg.contains("bad amount")
        ));
    }

    #[test]
    fn test_endpoints_join_onto_base() {
        let ledger = HttpLedger::new("http://ledger.local/v1/", Duration::from_secs(1)).unwrap();

        assert_eq!(
            ledger.endpoint("accounts/GABC").unwrap().as_str(),
            "http://ledger.local/v1/accounts/GABC"
        );
    }

    #[test]
    fn test_base_without_trailing_slash_keeps_its_path() {
        let ledger = HttpLedger::new("http://ledger.local/v1", Duration::from_secs(1)).unwrap();

        assert_eq!(
            ledger.endpoint("transfers").unwrap().as_str(),
            "http://ledger.local/v1/transfers"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            HttpLedger::new("not a url", Duration::from_secs(1)),
            Err(AppError::Config(_))
        ));
    }

    mod gateway {
        use std::sync::Arc;
        use std::time::Duration;

        use axum::extract::{Path, State};
        use axum::http::StatusCode;
        use axum::response::{IntoResponse, Response};
        use axum::routing::{get, post};
        use axum::{Json, Router};
        use serde_json::{json, Value};
        use tokio::sync::Mutex;

        /// Transfer bodies the fake gateway received.
        pub type Received = Arc<Mutex<Vec<Value>>>;

        async fn open_account() -> Json<Value> {
            Json(json!({"address": "GNEW", "secret": "SNEW"}))
        }

        async fn account(Path(address): Path<String>) -> Response {
            match address.as_str() {
                "GRICH" => Json(json!({"address": address, "balance": 1_500})).into_response(),
                "GDOWN" => StatusCode::SERVICE_UNAVAILABLE.into_response(),
                "GSLOW" => {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Json(json!({"address": address, "balance": 1})).into_response()
                }
                _ => StatusCode::NOT_FOUND.into_response(),
            }
        }

        async fn transfer(State(received): State<Received>, Json(body): Json<Value>) -> Response {
            let amount = body["amount"].as_u64().unwrap_or_default();
            received.lock().await.push(body);
            if amount > 1_000 {
                return (StatusCode::PAYMENT_REQUIRED, "underfunded").into_response();
            }
            Json(json!({"reference": "tx-1"})).into_response()
        }

        /// Serve the gateway on an ephemeral port, mounted under `/v1`.
        pub async fn spawn() -> (String, Received) {
            let received = Received::default();
            let app = Router::new()
                .route("/v1/accounts", post(open_account))
                .route("/v1/accounts/:address", get(account))
                .route("/v1/transfers", post(transfer))
                .with_state(received.clone());

            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });
            (format!("http://{}/v1", addr), received)
        }
    }

    fn client(base_url: &str) -> HttpLedger {
        HttpLedger::new(base_url, Duration::from_millis(500)).unwrap()
    }

    #[tokio::test]
    async fn test_open_account_and_balance() {
        let (base_url, _) = gateway::spawn().await;
        let ledger = client(&base_url);

        let wallet = ledger.open_account().await.unwrap();
        assert_eq!(wallet.address, "GNEW");
        assert_eq!(wallet.secret, "SNEW");
        assert_eq!(ledger.balance("GRICH").await.unwrap(), 1_500);
    }

    #[tokio::test]
    async fn test_transfer_sends_json_body() {
        let (base_url, received) = gateway::spawn().await;
        let ledger = client(&base_url);

        let receipt = ledger.transfer("SBUYER", "GSTORE", 500).await.unwrap();

        assert_eq!(receipt.reference, "tx-1");
        assert_eq!(
            received.lock().await.as_slice(),
            &[serde_json::json!({
                "source_secret": "SBUYER",
                "destination": "GSTORE",
                "amount": 500,
            })]
        );
    }

    #[tokio::test]
    async fn test_error_statuses_from_gateway() {
        let (base_url, _) = gateway::spawn().await;
        let ledger = client(&base_url);

        assert_eq!(
            ledger.transfer("SBUYER", "GSTORE", 5_000).await,
            Err(OracleError::InsufficientFunds)
        );
        assert_eq!(
            ledger.balance("GMISSING").await,
            Err(OracleError::UnknownAccount("GMISSING".to_string()))
        );
        assert!(matches!(
            ledger.balance("GDOWN").await,
            Err(OracleError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_slow_gateway_times_out() {
        let (base_url, _) = gateway::spawn().await;
        let ledger = client(&base_url);

        assert_eq!(
            ledger.balance("GSLOW").await,
            Err(OracleError::Timeout(Duration::from_millis(500)))
        );
    }

    #[tokio::test]
    async fn test_unreachable_gateway_is_unavailable() {
        // Bind then drop to get a port nothing listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let ledger = client(&format!("http://{}", addr));
        assert!(matches!(
            ledger.balance("GRICH").await,
            Err(OracleError::Unavailable(_))
        ));
    }
}

//! HTTP client for the PayDunya checkout API.
//!
//! Only two endpoints are used: invoice creation (to start a recharge) and
//! invoice verification (to confirm a recharge callback). Every request is
//! authenticated with the merchant key headers. A `response_code` other
//! than `"00"` means the gateway refused the request.

use super::{
    GatewayError, Invoice, InvoiceRequest, InvoiceStatus, InvoiceVerification, PaymentGateway,
};
use crate::config::PaydunyaConfig;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

const PROVIDER: &str = "paydunya";
const SUCCESS_CODE: &str = "00";
const STORE_NAME: &str = "Kpaya Recyclage Store";

#[derive(Serialize)]
struct CreateInvoiceBody<'a> {
    invoice: InvoiceBody<'a>,
    store: StoreBody<'a>,
    custom_data: CustomData<'a>,
    actions: ActionsBody,
}

#[derive(Serialize)]
struct InvoiceBody<'a> {
    total_amount: Decimal,
    description: &'a str,
}

#[derive(Serialize)]
struct StoreBody<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct CustomData<'a> {
    #[serde(rename = "companyId")]
    company_id: &'a str,
}

#[derive(Serialize)]
struct ActionsBody {
    return_url: String,
    cancel_url: String,
    callback_url: String,
}

#[derive(Serialize)]
struct VerifyBody<'a> {
    token: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreateInvoiceResponse {
    response_code: Option<String>,
    response_text: Option<String>,
    token: Option<String>,
    response_data: Option<ResponseData>,
}

#[derive(Debug, Deserialize)]
struct ResponseData {
    checkout_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    response_code: Option<String>,
    response_text: Option<String>,
    status: Option<String>,
    invoice: Option<VerifiedInvoice>,
    custom_data: Option<VerifiedCustomData>,
}

#[derive(Debug, Deserialize)]
struct VerifiedInvoice {
    /// PayDunya sends this either as a JSON number or a string
    total_amount: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct VerifiedCustomData {
    #[serde(rename = "companyId")]
    company_id: Option<String>,
}

/// PayDunya checkout client
pub struct PaydunyaGateway {
    client: Client,
    config: PaydunyaConfig,
}

impl PaydunyaGateway {
    pub fn new(config: PaydunyaConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url.trim_end_matches('/'), path)
    }

    /// Authenticated JSON POST to a checkout endpoint, not yet sent
    fn request<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> RequestBuilder {
        self.client
            .post(self.endpoint(path))
            .header("PAYDUNYA-MASTER-KEY", &self.config.master_key)
            .header("PAYDUNYA-PRIVATE-KEY", &self.config.private_key)
            .header("PAYDUNYA-TOKEN", &self.config.token)
            .json(body)
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Value, GatewayError> {
        let response = self
            .request(path, body)
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        decode_response(status, &body)
    }
}

#[async_trait]
impl PaymentGateway for PaydunyaGateway {
    fn provider(&self) -> &str {
        PROVIDER
    }

    async fn create_invoice(&self, request: InvoiceRequest) -> Result<Invoice, GatewayError> {
        let domain = self.config.app_domain.trim_end_matches('/');
        let return_url = redirect_url(domain, "success", &request.company_id)?;
        let cancel_url = redirect_url(domain, "cancel", &request.company_id)?;
        let body = CreateInvoiceBody {
            invoice: InvoiceBody {
                total_amount: request.amount,
                description: &request.description,
            },
            store: StoreBody { name: STORE_NAME },
            custom_data: CustomData {
                company_id: &request.company_id,
            },
            actions: ActionsBody {
                return_url,
                cancel_url,
                callback_url: self.config.callback_url(),
            },
        };

        let raw = self.post("/checkout/invoices/create", &body).await?;
        parse_create_response(raw)
    }

    async fn verify_invoice(&self, token: &str) -> Result<InvoiceVerification, GatewayError> {
        let raw = self
            .post("/checkout/invoices/verify/", &VerifyBody { token })
            .await?;
        parse_verify_response(token, raw)
    }
}

/// Page the payer is sent back to, with the company id as an encoded query parameter
fn redirect_url(domain: &str, page: &str, company_id: &str) -> Result<String, GatewayError> {
    Url::parse_with_params(&format!("{}/{}", domain, page), &[("company", company_id)])
        .map(String::from)
        .map_err(|e| GatewayError::InvalidRequest(format!("bad app domain {}: {}", domain, e)))
}

/// Turn an HTTP status and raw body into the JSON document to parse
fn decode_response(status: StatusCode, body: &[u8]) -> Result<Value, GatewayError> {
    if !status.is_success() {
        return Err(GatewayError::Rejected {
            code: status.as_str().to_string(),
            message: format!("HTTP {}", status),
        });
    }

    serde_json::from_slice(body).map_err(|e| GatewayError::MalformedResponse(e.to_string()))
}

fn check_response_code(code: Option<&str>, text: Option<&str>) -> Result<(), GatewayError> {
    match code {
        Some(SUCCESS_CODE) => Ok(()),
        other => Err(GatewayError::Rejected {
            code: other.unwrap_or("missing").to_string(),
            message: text.unwrap_or("no response text").to_string(),
        }),
    }
}

fn parse_create_response(raw: Value) -> Result<Invoice, GatewayError> {
    let response: CreateInvoiceResponse = serde_json::from_value(raw)
        .map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;
    check_response_code(
        response.response_code.as_deref(),
        response.response_text.as_deref(),
    )?;

    let token = response
        .token
        .ok_or_else(|| GatewayError::MalformedResponse("missing invoice token".to_string()))?;

    // Older API versions return the checkout URL as the response text
    let checkout_url = response
        .response_data
        .and_then(|data| data.checkout_url)
        .or_else(|| response.response_text.filter(|text| text.starts_with("http")))
        .ok_or_else(|| GatewayError::MalformedResponse("missing checkout url".to_string()))?;

    Ok(Invoice {
        token,
        checkout_url,
    })
}

fn parse_verify_response(token: &str, raw: Value) -> Result<InvoiceVerification, GatewayError> {
    let response: VerifyResponse = serde_json::from_value(raw)
        .map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;
    check_response_code(
        response.response_code.as_deref(),
        response.response_text.as_deref(),
    )?;

    let status = response
        .status
        .ok_or_else(|| GatewayError::MalformedResponse("missing invoice status".to_string()))?;

    let verified_amount = response
        .invoice
        .and_then(|invoice| invoice.total_amount)
        .as_ref()
        .and_then(decimal_from_json)
        .ok_or_else(|| {
            GatewayError::MalformedResponse("missing or invalid invoice.total_amount".to_string())
        })?;

    let company_id = response
        .custom_data
        .and_then(|data| data.company_id)
        .filter(|id| !id.trim().is_empty());

    Ok(InvoiceVerification {
        token: token.to_string(),
        status: InvoiceStatus::from(status.as_str()),
        verified_amount,
        company_id,
    })
}

fn decimal_from_json(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(number) => Decimal::from_str(&number.to_string()).ok(),
        Value::String(text) => Decimal::from_str(text.trim()).ok(),
        _ => None,
    }
}

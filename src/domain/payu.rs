//! Hosted-checkout payment rail. The payer's browser posts a signed form to
//! the rail; the rail posts the signed result back to our return URLs.

use {
    super::error::PipelineError,
    super::id::{GatewayOrderRef, GatewayPaymentRef, OrderRef},
    super::money::MinorUnits,
    super::order::Order,
    serde::{Deserialize, Serialize},
};

/// Who is paying. Sent to the rail and echoed back inside the signed result.
#[derive(Debug, Clone)]
pub struct Payer {
    pub name: String,
    pub email: String,
    pub phone: String,
}

impl Payer {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        phone: impl Into<String>,
    ) -> Result<Self, PipelineError> {
        let payer = Self {
            name: name.into().trim().to_string(),
            email: email.into().trim().to_string(),
            phone: phone.into().trim().to_string(),
        };
        if payer.name.is_empty() || payer.email.is_empty() || payer.phone.is_empty() {
            return Err(PipelineError::Validation(
                "name, email and phone are required".into(),
            ));
        }
        // The checkout hash is pipe-delimited.
        if [&payer.name, &payer.email, &payer.phone]
            .iter()
            .any(|v| v.contains('|'))
        {
            return Err(PipelineError::Validation("payer fields must not contain '|'".into()));
        }
        Ok(payer)
    }
}

/// Gateway reference stamped on orders routed to this rail. The rail itself
/// identifies the order by `txnid`, which is our order ref.
pub fn gateway_order_ref(order_ref: &OrderRef) -> Result<GatewayOrderRef, PipelineError> {
    GatewayOrderRef::new(format!("order_payu_{order_ref}"))
}

/// Signed form fields the payer's browser posts to the rail.
#[derive(Debug, Clone, Serialize)]
pub struct PayuCheckout {
    pub key: String,
    pub txnid: String,
    pub amount: String,
    pub productinfo: String,
    pub firstname: String,
    pub email: String,
    pub phone: String,
    pub surl: String,
    pub furl: String,
    pub udf1: String,
    pub udf2: String,
    pub hash: String,
}

impl PayuCheckout {
    pub fn signed(
        merchant_key: &str,
        order: &Order,
        payer: &Payer,
        success_url: &str,
        failure_url: &str,
        salt: &str,
    ) -> Self {
        let mut checkout = Self {
            key: merchant_key.to_string(),
            txnid: order.order_ref.to_string(),
            amount: order.amount.to_major_string(),
            productinfo: format!("{} Bill {}", order.bill_category, order.customer_ref),
            firstname: payer.name.clone(),
            email: payer.email.clone(),
            phone: payer.phone.clone(),
            surl: success_url.to_string(),
            furl: failure_url.to_string(),
            udf1: order.customer_ref.clone(),
            udf2: order.order_ref.to_string(),
            hash: String::new(),
        };
        checkout.hash = crate::signature::request_hash(&checkout.hashed_fields(), salt);
        checkout
    }

    /// `key|txnid|amount|productinfo|firstname|email`
    pub fn hashed_fields(&self) -> [&str; 6] {
        [
            &self.key,
            &self.txnid,
            &self.amount,
            &self.productinfo,
            &self.firstname,
            &self.email,
        ]
    }
}

/// Result the rail posts back (form-encoded on the return URLs, JSON on the
/// mobile verify API). Every field is optional on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PayuResponse {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub txnid: String,
    #[serde(default)]
    pub amount: String,
    #[serde(default)]
    pub productinfo: String,
    #[serde(default)]
    pub firstname: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub mihpayid: Option<String>,
}

impl PayuResponse {
    pub fn hashed_fields(&self) -> [&str; 6] {
        [
            &self.key,
            &self.txnid,
            &self.amount,
            &self.productinfo,
            &self.firstname,
            &self.email,
        ]
    }

    /// Reverse hash over the response's own fields:
    /// `salt|status|` + ten empty fields + `|email|firstname|productinfo|amount|txnid|key`.
    pub fn verify(&self, salt: &str) -> bool {
        !self.hash.is_empty()
            && crate::signature::verify_response(
                &self.status,
                &self.hashed_fields(),
                salt,
                &self.hash,
            )
    }

    pub fn is_success(&self) -> bool {
        self.status.trim().eq_ignore_ascii_case("success")
    }

    pub fn amount(&self) -> Result<MinorUnits, PipelineError> {
        MinorUnits::from_major_str(&self.amount)
    }

    /// The rail's payment id, or the txnid when the rail sent none.
    pub fn payment_ref(&self) -> Result<GatewayPaymentRef, PipelineError> {
        let id = self
            .mihpayid
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .unwrap_or(&self.txnid);
        GatewayPaymentRef::new(format!("pay_payu_{id}"))
    }
}

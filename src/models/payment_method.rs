use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentMethodKind {
    BankTransfer,
    Crypto,
    Paypal,
    Zelle,
    Binance,
    BinancePayQr,
    Airtm,
    Skrill,
    Sinpe,
    Other,
}

/// Where and how to send money for a payment method, one shape per kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentDetails {
    BankTransfer {
        bank_name: String,
        account_holder: String,
        account_number: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        routing_number: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        swift_code: Option<String>,
    },
    Crypto {
        network: String,
        address: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        asset: Option<String>,
    },
    Paypal {
        email: String,
    },
    Zelle {
        recipient: String,
        email_or_phone: String,
    },
    Binance {
        pay_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        email: Option<String>,
    },
    BinancePayQr {
        qr_image_url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pay_id: Option<String>,
    },
    Airtm {
        email: String,
    },
    Skrill {
        email: String,
    },
    Sinpe {
        phone: String,
        recipient: String,
    },
    /// Free-form key/value pairs for anything without a dedicated shape
    Other {
        #[serde(default)]
        fields: BTreeMap<String, String>,
    },
}

impl PaymentDetails {
    pub fn kind(&self) -> PaymentMethodKind {
        match self {
            PaymentDetails::BankTransfer { .. } => PaymentMethodKind::BankTransfer,
            PaymentDetails::Crypto { .. } => PaymentMethodKind::Crypto,
            PaymentDetails::Paypal { .. } => PaymentMethodKind::Paypal,
            PaymentDetails::Zelle { .. } => PaymentMethodKind::Zelle,
            PaymentDetails::Binance { .. } => PaymentMethodKind::Binance,
            PaymentDetails::BinancePayQr { .. } => PaymentMethodKind::BinancePayQr,
            PaymentDetails::Airtm { .. } => PaymentMethodKind::Airtm,
            PaymentDetails::Skrill { .. } => PaymentMethodKind::Skrill,
            PaymentDetails::Sinpe { .. } => PaymentMethodKind::Sinpe,
            PaymentDetails::Other { .. } => PaymentMethodKind::Other,
        }
    }

    /// Required text fields, paired with their names, for emptiness checks.
    fn required_fields(&self) -> Vec<(&'static str, &str)> {
        match self {
            PaymentDetails::BankTransfer {
                bank_name,
                account_holder,
                account_number,
                ..
            } => vec![
                ("bank_name", bank_name.as_str()),
                ("account_holder", account_holder.as_str()),
                ("account_number", account_number.as_str()),
            ],
            PaymentDetails::Crypto {
                network, address, ..
            } => vec![("network", network.as_str()), ("address", address.as_str())],
            PaymentDetails::Paypal { email }
            | PaymentDetails::Airtm { email }
            | PaymentDetails::Skrill { email } => vec![("email", email.as_str())],
            PaymentDetails::Zelle {
                recipient,
                email_or_phone,
            } => vec![("recipient", recipient.as_str()), ("email_or_phone", email_or_phone.as_str())],
            PaymentDetails::Binance { pay_id, .. } => vec![("pay_id", pay_id.as_str())],
            PaymentDetails::BinancePayQr { qr_image_url, .. } => {
                vec![("qr_image_url", qr_image_url.as_str())]
            }
            PaymentDetails::Sinpe { phone, recipient } => {
                vec![("phone", phone.as_str()), ("recipient", recipient.as_str())]
            }
            PaymentDetails::Other { .. } => vec![],
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (field, value) in self.required_fields() {
            if value.trim().is_empty() {
                return Err(AppError::Validation(format!(
                    "{} is required for {} payment methods",
                    field,
                    self.kind().as_ref()
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: String,
    pub name: String,
    pub kind: PaymentMethodKind,
    pub details: PaymentDetails,
    pub instructions: String,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct CreatePaymentMethod {
    pub name: String,
    pub details: PaymentDetails,
    pub instructions: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl CreatePaymentMethod {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::Validation("name cannot be empty".into()));
        }
        if self.instructions.trim().is_empty() {
            return Err(AppError::Validation("instructions cannot be empty".into()));
        }
        self.details.validate()
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdatePaymentMethod {
    pub name: Option<String>,
    pub details: Option<PaymentDetails>,
    pub instructions: Option<String>,
    pub is_active: Option<bool>,
}

impl UpdatePaymentMethod {
    pub fn validate(&self) -> Result<()> {
        if let Some(ref name) = self.name
            && name.trim().is_empty()
        {
            return Err(AppError::Validation("name cannot be empty".into()));
        }
        if let Some(ref details) = self.details {
            details.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn details_are_tagged_by_type() {
        let details: PaymentDetails = serde_json::from_value(json!({
            "type": "crypto",
            "network": "TRC20",
            "address": "TXYZ123",
        }))
        .unwrap();

        assert_eq!(details.kind(), PaymentMethodKind::Crypto);
        assert_eq!(
            serde_json::to_value(&details).unwrap(),
            json!({ "type": "crypto", "network": "TRC20", "address": "TXYZ123" })
        );
    }

    #[test]
    fn qr_variant_uses_snake_case_tag() {
        let details = PaymentDetails::BinancePayQr {
            qr_image_url: "https://cdn.example.com/qr.png".into(),
            pay_id: None,
        };
        let value = serde_json::to_value(&details).unwrap();
        assert_eq!(value["type"], "binance_pay_qr");
        assert_eq!(details.kind().as_ref(), "binance_pay_qr");
    }

    #[test]
    fn other_variant_accepts_free_form_fields() {
        let details: PaymentDetails = serde_json::from_value(json!({
            "type": "other",
            "fields": { "wallet": "abc", "note": "ask support" }
        }))
        .unwrap();
        match details {
            PaymentDetails::Other { fields } => assert_eq!(fields.len(), 2),
            other => panic!("unexpected variant {:?}", other),
        }
    }

    #[test]
    fn unknown_type_is_rejected() {
        let result: std::result::Result<PaymentDetails, _> =
            serde_json::from_value(json!({ "type": "cheque", "number": "1" }));
        assert!(result.is_err());
    }

    #[test]
    fn blank_required_field_fails_validation() {
        let details = PaymentDetails::Paypal { email: " ".into() };
        assert!(matches!(details.validate(), Err(AppError::Validation(_))));
    }
}

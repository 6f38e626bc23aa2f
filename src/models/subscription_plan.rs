use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionPlan {
    pub id: String,
    pub name: String,
    pub duration_months: i32,
    pub price: f64,
    pub currency: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreatePlan {
    pub name: String,
    pub duration_months: i32,
    pub price: f64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl CreatePlan {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::Validation("name cannot be empty".into()));
        }
        validate_duration(self.duration_months)?;
        validate_price(self.price)
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdatePlan {
    pub name: Option<String>,
    pub duration_months: Option<i32>,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub description: Option<Option<String>>,
    pub is_active: Option<bool>,
}

impl UpdatePlan {
    pub fn validate(&self) -> Result<()> {
        if let Some(ref name) = self.name
            && name.trim().is_empty()
        {
            return Err(AppError::Validation("name cannot be empty".into()));
        }
        if let Some(duration) = self.duration_months {
            validate_duration(duration)?;
        }
        if let Some(price) = self.price {
            validate_price(price)?;
        }
        Ok(())
    }
}

fn validate_duration(months: i32) -> Result<()> {
    if months < 1 {
        return Err(AppError::Validation(
            "duration_months must be at least 1".into(),
        ));
    }
    Ok(())
}

fn validate_price(price: f64) -> Result<()> {
    if !price.is_finite() || price < 0.0 {
        return Err(AppError::Validation("price cannot be negative".into()));
    }
    Ok(())
}

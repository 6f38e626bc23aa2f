use rusqlite::{Connection, Transaction};

use super::{begin, concurrent_change, issuance, load_user, non_blank, require_admin};
use crate::db::queries;
use crate::error::{AppError, Result};
use crate::models::*;
use crate::pagination::{Paginated, clamp_limit, clamp_offset};

/// Record a proof of payment against the caller's open request. The request
/// moves to `pending_payment` and points at the new payment; resubmitting
/// replaces the pointer.
pub fn submit_payment(
    conn: &mut Connection,
    user_id: &str,
    input: &SubmitPayment,
) -> Result<Payment> {
    let tx = begin(conn)?;
    load_user(&tx, user_id)?;

    let request = queries::get_license_request_by_id(&tx, &input.license_request_id)?
        .ok_or_else(|| AppError::NotFound("License request not found".into()))?;
    if queries::get_plan_by_id(&tx, &input.subscription_plan_id)?.is_none() {
        return Err(AppError::NotFound("Subscription plan not found".into()));
    }
    let method = queries::get_payment_method_by_id(&tx, &input.payment_method_id)?
        .ok_or_else(|| AppError::NotFound("Payment method not found".into()))?;

    if request.user_id != user_id {
        return Err(AppError::Forbidden(
            "You can only pay for your own license requests".into(),
        ));
    }
    if request.status.is_terminal() {
        return Err(AppError::InvalidState(format!(
            "Cannot submit a payment for a request with status {}",
            request.status.as_ref()
        )));
    }
    if !method.is_active {
        return Err(AppError::Validation(
            "Payment method is no longer available".into(),
        ));
    }
    input.validate()?;

    let payment = queries::create_payment(&tx, user_id, input)?;
    if !queries::attach_payment_to_request(
        &tx,
        &request.id,
        &payment.id,
        &input.subscription_plan_id,
    )? {
        return Err(concurrent_change("License request"));
    }
    tx.commit()?;

    tracing::info!(
        payment_id = %payment.id,
        request_id = %request.id,
        amount = payment.amount,
        currency = %payment.currency,
        "Payment submitted"
    );
    Ok(payment)
}

/// Verify or reject a payment and carry the linked request along, all in one
/// transaction.
///
/// Verifying moves the request to `payment_verified`; with `expires_at` it
/// also issues the license and approves the request. A verified payment whose
/// request is still `payment_verified` can be verified again with an expiry
/// to finish issuing. Rejecting rejects the request with the same reason.
pub fn decide_payment(
    conn: &mut Connection,
    admin_id: &str,
    payment_id: &str,
    input: &DecidePayment,
) -> Result<PaymentDecision> {
    let tx = begin(conn)?;
    let admin = require_admin(&tx, admin_id)?;
    if let Some(expires_at) = input.expires_at {
        validate_expires_at(expires_at)?;
    }

    let payment = queries::get_payment_by_id(&tx, payment_id)?
        .ok_or_else(|| AppError::NotFound("Payment not found".into()))?;
    let request = match payment.license_request_id.as_deref() {
        Some(request_id) => queries::get_license_request_by_id(&tx, request_id)?,
        None => None,
    };

    let license = match input.action {
        PaymentAction::Verify => {
            verify(&tx, &admin, &payment, request.as_ref(), input.expires_at)?
        }
        PaymentAction::Reject => {
            let reason = non_blank(input.reason.as_deref()).unwrap_or(DEFAULT_REJECTION_REASON);
            reject(&tx, &admin, &payment, request.as_ref(), reason)?;
            None
        }
    };

    let payment = queries::get_payment_by_id(&tx, payment_id)?
        .ok_or_else(|| AppError::NotFound("Payment not found".into()))?;
    let request = match payment.license_request_id.as_deref() {
        Some(request_id) => queries::get_license_request_by_id(&tx, request_id)?,
        None => None,
    };
    tx.commit()?;

    tracing::info!(
        payment_id,
        admin_id = %admin.id,
        action = input.action.as_ref(),
        request_id = ?request.as_ref().map(|r| &r.id),
        license_id = ?license.as_ref().map(|l| &l.id),
        "Payment decided"
    );
    Ok(PaymentDecision {
        payment,
        request,
        license,
    })
}

fn verify(
    tx: &Transaction,
    admin: &User,
    payment: &Payment,
    request: Option<&LicenseRequest>,
    expires_at: Option<i64>,
) -> Result<Option<License>> {
    let retry = payment.status == PaymentStatus::Verified
        && expires_at.is_some()
        && request.is_some_and(|r| r.status == RequestStatus::PaymentVerified);
    if payment.status != PaymentStatus::Pending && !retry {
        return Err(AppError::InvalidState(format!(
            "Payment is already {}",
            payment.status.as_ref()
        )));
    }
    if let Some(request) = request
        && !matches!(
            request.status,
            RequestStatus::PendingPayment | RequestStatus::PaymentVerified
        )
    {
        return Err(AppError::InvalidState(format!(
            "Linked license request has status {}",
            request.status.as_ref()
        )));
    }

    if payment.status == PaymentStatus::Pending
        && !queries::verify_payment(tx, &payment.id, PaymentStatus::Pending, &admin.id)?
    {
        return Err(concurrent_change("Payment"));
    }

    let Some(request) = request else {
        if expires_at.is_some() {
            tracing::warn!(
                payment_id = %payment.id,
                "Payment has no linked request, verified without issuing a license"
            );
        }
        return Ok(None);
    };

    if request.status == RequestStatus::PendingPayment
        && !queries::set_request_status(
            tx,
            &request.id,
            RequestStatus::PendingPayment,
            RequestStatus::PaymentVerified,
        )?
    {
        return Err(concurrent_change("License request"));
    }

    let Some(expires_at) = expires_at else {
        return Ok(None);
    };
    if !queries::approve_request(
        tx,
        &request.id,
        RequestStatus::PaymentVerified,
        &admin.id,
        None,
    )? {
        return Err(concurrent_change("License request"));
    }
    let license = issuance::issue_license(
        tx,
        &issuance::license_for_request(request, expires_at, &admin.id, "payment"),
    )?;
    Ok(Some(license))
}

fn reject(
    tx: &Transaction,
    admin: &User,
    payment: &Payment,
    request: Option<&LicenseRequest>,
    reason: &str,
) -> Result<()> {
    if payment.status != PaymentStatus::Pending {
        return Err(AppError::InvalidState(format!(
            "Payment is already {}",
            payment.status.as_ref()
        )));
    }
    if !queries::reject_payment(tx, &payment.id, reason)? {
        return Err(concurrent_change("Payment"));
    }

    if let Some(request) = request
        && request.status.is_open()
        && !queries::reject_request(
            tx,
            &request.id,
            request.status,
            Some(&admin.id),
            Some(reason),
        )?
    {
        return Err(concurrent_change("License request"));
    }
    Ok(())
}

/// Fetch a payment visible to `user`: their own, or any for an admin.
pub fn get_payment(conn: &Connection, user: &User, payment_id: &str) -> Result<Payment> {
    let payment = queries::get_payment_by_id(conn, payment_id)?
        .ok_or_else(|| AppError::NotFound("Payment not found".into()))?;
    if payment.user_id != user.id && !user.is_admin() {
        return Err(AppError::Forbidden("You can only view your own payments".into()));
    }
    Ok(payment)
}

pub fn list_payments(
    conn: &Connection,
    user: &User,
    query: &PaymentListQuery,
) -> Result<Paginated<Payment>> {
    let limit = clamp_limit(query.limit);
    let offset = clamp_offset(query.offset);
    let user_filter = if user.is_admin() {
        None
    } else {
        Some(user.id.as_str())
    };
    let (items, total) =
        queries::list_payments_paginated(conn, user_filter, query.status, limit, offset)?;
    Ok(Paginated::new(items, total, limit, offset))
}

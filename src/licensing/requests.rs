use rusqlite::Connection;

use super::{begin, concurrent_change, issuance, load_user, non_blank, require_admin};
use crate::db::queries::{self, RequestFilter};
use crate::error::{AppError, Result};
use crate::models::*;
use crate::pagination::{Paginated, clamp_limit, clamp_offset};

/// Open a new license request for `user_id`.
///
/// With a subscription plan the request starts in `pending_payment`, without
/// one in `pending`. A user can hold only one open request at a time.
pub fn create_request(
    conn: &mut Connection,
    user_id: &str,
    input: &CreateLicenseRequest,
) -> Result<LicenseRequest> {
    let fields = input.fields.normalized()?;
    let plan_id = non_blank(input.subscription_plan_id.as_deref());

    let tx = begin(conn)?;
    load_user(&tx, user_id)?;

    let status = match plan_id {
        Some(plan_id) => {
            let plan = queries::get_plan_by_id(&tx, plan_id)?
                .ok_or_else(|| AppError::NotFound("Subscription plan not found".into()))?;
            if !plan.is_active {
                return Err(AppError::Validation(
                    "Subscription plan is no longer available".into(),
                ));
            }
            RequestStatus::PendingPayment
        }
        None => RequestStatus::Pending,
    };

    if let Some(open) = queries::get_open_request_for_user(&tx, user_id)? {
        tracing::warn!(user_id, open_request = %open.id, "Refused second open license request");
        return Err(AppError::Conflict(format!(
            "You already have an open license request (status: {})",
            open.status.as_ref()
        )));
    }

    let request = queries::create_license_request(&tx, user_id, &fields, plan_id, status)?;
    tx.commit()?;

    tracing::info!(
        request_id = %request.id,
        user_id,
        status = request.status.as_ref(),
        "License request created"
    );
    Ok(request)
}

/// Replace the editable fields of the caller's own request while it is pending.
pub fn edit_request(
    conn: &mut Connection,
    user_id: &str,
    request_id: &str,
    input: &RequestFields,
) -> Result<LicenseRequest> {
    let tx = begin(conn)?;

    let request = queries::get_license_request_by_id(&tx, request_id)?
        .ok_or_else(|| AppError::NotFound("License request not found".into()))?;
    if request.user_id != user_id {
        return Err(AppError::Forbidden(
            "You can only edit your own license requests".into(),
        ));
    }
    if request.status != RequestStatus::Pending {
        return Err(AppError::InvalidState(format!(
            "Only pending requests can be edited (status: {})",
            request.status.as_ref()
        )));
    }

    let fields = input.normalized()?;
    if !queries::update_pending_request_fields(&tx, request_id, &fields)? {
        return Err(concurrent_change("License request"));
    }

    let request = queries::get_license_request_by_id(&tx, request_id)?
        .ok_or_else(|| AppError::NotFound("License request not found".into()))?;
    tx.commit()?;

    tracing::info!(request_id, user_id, "License request edited");
    Ok(request)
}

/// Approve, reject or exempt a request.
///
/// Approve and reject apply to `pending` requests, exempt to payment-gated
/// ones (`pending_payment`, `payment_verified`). Approve and exempt require
/// an expiry and issue exactly one license in the same transaction. A
/// decision on a terminal request fails, so a request is never licensed twice.
pub fn decide_request(
    conn: &mut Connection,
    admin_id: &str,
    request_id: &str,
    input: &DecideRequest,
) -> Result<RequestDecision> {
    let tx = begin(conn)?;
    let admin = require_admin(&tx, admin_id)?;

    let request = queries::get_license_request_by_id(&tx, request_id)?
        .ok_or_else(|| AppError::NotFound("License request not found".into()))?;
    if !input.action.allowed_from(request.status) {
        tracing::warn!(
            request_id,
            action = input.action.as_ref(),
            status = request.status.as_ref(),
            "Refused request decision"
        );
        return Err(AppError::InvalidState(format!(
            "Cannot {} a request with status {}",
            input.action.as_ref(),
            request.status.as_ref()
        )));
    }

    let notes = non_blank(input.admin_notes.as_deref());
    let license = if input.action.issues_license() {
        let expires_at = input.expires_at.ok_or_else(|| {
            AppError::Validation(format!(
                "expires_at is required to {} a request",
                input.action.as_ref()
            ))
        })?;
        validate_expires_at(expires_at)?;
        if !queries::approve_request(&tx, request_id, request.status, &admin.id, notes)? {
            return Err(concurrent_change("License request"));
        }
        let source = match input.action {
            RequestAction::Exempt => "exemption",
            _ => "approval",
        };
        let license = issuance::issue_license(
            &tx,
            &issuance::license_for_request(&request, expires_at, &admin.id, source),
        )?;
        Some(license)
    } else {
        if !queries::reject_request(&tx, request_id, request.status, Some(&admin.id), notes)? {
            return Err(concurrent_change("License request"));
        }
        None
    };

    let request = queries::get_license_request_by_id(&tx, request_id)?
        .ok_or_else(|| AppError::NotFound("License request not found".into()))?;
    tx.commit()?;

    tracing::info!(
        request_id,
        admin_id = %admin.id,
        action = input.action.as_ref(),
        license_id = ?license.as_ref().map(|l| &l.id),
        "License request decided"
    );
    Ok(RequestDecision { request, license })
}

/// Delete a request. An approved request is only deleted together with the
/// licenses issued for it, and only when `cascade` is set. Payments that
/// referenced the request are kept and lose the link.
///
/// Returns the number of licenses deleted.
pub fn delete_request(
    conn: &mut Connection,
    admin_id: &str,
    request_id: &str,
    cascade: bool,
) -> Result<usize> {
    let tx = begin(conn)?;
    require_admin(&tx, admin_id)?;

    let request = queries::get_license_request_by_id(&tx, request_id)?
        .ok_or_else(|| AppError::NotFound("License request not found".into()))?;

    let mut deleted_licenses = 0;
    if request.status == RequestStatus::Approved {
        if !cascade {
            return Err(AppError::InvalidState(
                "Approved requests can only be deleted with cascade=true, which also deletes their licenses"
                    .into(),
            ));
        }
        deleted_licenses = queries::delete_licenses_for_request(&tx, request_id)?;
    }

    if !queries::delete_license_request(&tx, request_id)? {
        return Err(AppError::NotFound("License request not found".into()));
    }
    tx.commit()?;

    tracing::info!(request_id, admin_id, deleted_licenses, "License request deleted");
    Ok(deleted_licenses)
}

/// Fetch a request visible to `user`: their own, or any for an admin.
pub fn get_request(conn: &Connection, user: &User, request_id: &str) -> Result<LicenseRequest> {
    let request = queries::get_license_request_by_id(conn, request_id)?
        .ok_or_else(|| AppError::NotFound("License request not found".into()))?;
    if request.user_id != user.id && !user.is_admin() {
        return Err(AppError::Forbidden(
            "You can only view your own license requests".into(),
        ));
    }
    Ok(request)
}

/// Users see their own requests; admins see everyone's and may search.
pub fn list_requests(
    conn: &Connection,
    user: &User,
    query: &RequestListQuery,
) -> Result<Paginated<LicenseRequest>> {
    let limit = clamp_limit(query.limit);
    let offset = clamp_offset(query.offset);
    let filter = if user.is_admin() {
        RequestFilter {
            user_id: None,
            status: query.status,
            search: query.search.as_deref(),
        }
    } else {
        RequestFilter {
            user_id: Some(&user.id),
            status: query.status,
            search: None,
        }
    };
    let (items, total) = queries::list_license_requests_paginated(conn, &filter, limit, offset)?;
    Ok(Paginated::new(items, total, limit, offset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;

    fn setup() -> (Connection, User, User) {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        let make = |email: &str, role: UserRole| {
            let input = CreateUser {
                email: email.into(),
                name: email.into(),
                role: Some(role),
            };
            queries::create_user(&conn, &input, &queries::generate_api_key()).unwrap()
        };
        let user = make("user@example.com", UserRole::User);
        let admin = make("admin@example.com", UserRole::Admin);
        (conn, user, admin)
    }

    fn new_request(ids: &[&str]) -> CreateLicenseRequest {
        CreateLicenseRequest {
            fields: RequestFields {
                first_name: " Ada ".into(),
                last_name: "Lovelace".into(),
                account_ids: ids.iter().map(|s| s.to_string()).collect(),
                reason: "Funded account".into(),
            },
            subscription_plan_id: None,
        }
    }

    fn decision(action: RequestAction, expires_at: Option<i64>) -> DecideRequest {
        DecideRequest {
            action,
            admin_notes: None,
            expires_at,
        }
    }

    #[test]
    fn create_normalizes_input() {
        let (mut conn, user, _) = setup();
        let request = create_request(&mut conn, &user.id, &new_request(&["7", " 8", "7"])).unwrap();
        assert_eq!(request.status, RequestStatus::Pending);
        assert_eq!(request.first_name, "Ada");
        assert_eq!(request.account_ids, vec!["7", "8"]);
    }

    #[test]
    fn create_with_unknown_plan_is_not_found() {
        let (mut conn, user, _) = setup();
        let mut input = new_request(&["7"]);
        input.subscription_plan_id = Some("nope".into());
        let err = create_request(&mut conn, &user.id, &input).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn non_admin_cannot_decide() {
        let (mut conn, user, _) = setup();
        let request = create_request(&mut conn, &user.id, &new_request(&["7"])).unwrap();
        let err = decide_request(
            &mut conn,
            &user.id,
            &request.id,
            &decision(RequestAction::Approve, Some(2_000_000_000)),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn approve_without_expiry_is_validation_error() {
        let (mut conn, user, admin) = setup();
        let request = create_request(&mut conn, &user.id, &new_request(&["7"])).unwrap();
        let err = decide_request(
            &mut conn,
            &admin.id,
            &request.id,
            &decision(RequestAction::Approve, None),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let stored = queries::get_license_request_by_id(&conn, &request.id).unwrap().unwrap();
        assert_eq!(stored.status, RequestStatus::Pending);
    }

    #[test]
    fn exempt_requires_payment_gated_request() {
        let (mut conn, user, admin) = setup();
        let request = create_request(&mut conn, &user.id, &new_request(&["7"])).unwrap();
        let err = decide_request(
            &mut conn,
            &admin.id,
            &request.id,
            &decision(RequestAction::Exempt, Some(2_000_000_000)),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[test]
    fn list_scopes_users_to_their_own_requests() {
        let (mut conn, user, admin) = setup();
        create_request(&mut conn, &user.id, &new_request(&["7"])).unwrap();
        create_request(&mut conn, &admin.id, &new_request(&["9"])).unwrap();

        let mine = list_requests(&conn, &user, &RequestListQuery::default()).unwrap();
        assert_eq!(mine.total, 1);
        assert_eq!(mine.items[0].user_id, user.id);

        let all = list_requests(&conn, &admin, &RequestListQuery::default()).unwrap();
        assert_eq!(all.total, 2);

        let other = get_request(&conn, &user, &all.items.iter().find(|r| r.user_id == admin.id).unwrap().id);
        assert!(matches!(other, Err(AppError::Forbidden(_))));
    }
}

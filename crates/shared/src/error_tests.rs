use super::*;
use rstest::rstest;

#[rstest]
#[case(AppError::NotFound("test".into()), 404, "NOT_FOUND")]
#[case(AppError::Validation("test".into()), 400, "VALIDATION_ERROR")]
#[case(AppError::BusinessRule("test".into()), 422, "BUSINESS_RULE_VIOLATION")]
#[case(AppError::Conflict("test".into()), 409, "CONFLICT")]
#[case(AppError::Integrity("test".into()), 500, "INTEGRITY_ERROR")]
#[case(AppError::Database("test".into()), 500, "DATABASE_ERROR")]
#[case(AppError::Internal("test".into()), 500, "INTERNAL_ERROR")]
fn test_app_error_status_and_code(
    #[case] error: AppError,
    #[case] status: u16,
    #[case] code: &str,
) {
    assert_eq!(error.status_code(), status);
    assert_eq!(error.error_code(), code);
}

#[test]
fn test_app_error_display() {
    assert_eq!(
        format!("{}", AppError::NotFound("msg".into())),
        "Not found: msg"
    );
    assert_eq!(
        format!("{}", AppError::Validation("msg".into())),
        "Validation error: msg"
    );
    assert_eq!(
        format!("{}", AppError::Conflict("msg".into())),
        "Conflict: msg"
    );
    assert_eq!(
        format!("{}", AppError::Integrity("msg".into())),
        "Integrity violation: msg"
    );
}

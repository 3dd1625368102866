//! Identity-provider token verification and the request's current user.
//!
//! Tokens are minted by the external identity provider; this service only
//! verifies them and derives the pharmacy/branch scope a request runs under.

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::app_error::AppError;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    PharmacyAdmin,
    BranchManager,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::PharmacyAdmin => "PHARMACY_ADMIN",
            UserRole::BranchManager => "BRANCH_MANAGER",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Claims {
    pub sub: String,
    pub email: Option<String>,
    pub role: UserRole,
    pub pharmacy_id: Option<String>,
    pub branch: Option<String>,
    pub exp: usize,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq, ToSchema)]
pub struct AdminIdentity {
    pub uid: String,
    pub role: UserRole,
}

#[derive(Serialize, Debug, Clone, ToSchema)]
pub struct CurrentUser {
    pub uid: String,
    pub email: Option<String>,
    pub role: UserRole,
    pub pharmacy_id: Option<String>,
    pub branch: Option<String>,
    /// Set when a pharmacy admin is acting as one of their branches.
    pub admin: Option<AdminIdentity>,
}

/// The pharmacy and branch a branch-level request operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchScope {
    pub pharmacy_id: String,
    pub branch_name: String,
}

impl CurrentUser {
    /// Builds the request user from verified claims, optionally switching an
    /// admin into one of their branches.
    pub fn from_claims(claims: Claims, act_as_branch: Option<String>) -> Self {
        let act_as_branch = act_as_branch.filter(|branch| !branch.trim().is_empty());

        match (claims.role, act_as_branch) {
            (UserRole::PharmacyAdmin, Some(branch)) => CurrentUser {
                admin: Some(AdminIdentity {
                    uid: claims.sub.clone(),
                    role: UserRole::PharmacyAdmin,
                }),
                uid: claims.sub,
                email: claims.email,
                role: UserRole::BranchManager,
                pharmacy_id: claims.pharmacy_id,
                branch: Some(branch),
            },
            _ => CurrentUser {
                uid: claims.sub,
                email: claims.email,
                role: claims.role,
                pharmacy_id: claims.pharmacy_id,
                branch: claims.branch,
                admin: None,
            },
        }
    }

    pub fn is_pharmacy_admin(&self) -> bool {
        self.role == UserRole::PharmacyAdmin
    }

    pub fn is_branch_manager(&self) -> bool {
        self.role == UserRole::BranchManager
    }

    pub fn can_return_to_admin(&self) -> bool {
        self.is_branch_manager()
            && self
                .admin
                .as_ref()
                .is_some_and(|admin| admin.role == UserRole::PharmacyAdmin)
    }

    pub fn pharmacy_id(&self) -> Result<&str, AppError> {
        if self.is_pharmacy_admin() {
            return Ok(&self.uid);
        }
        if let Some(admin) = &self.admin {
            return Ok(&admin.uid);
        }
        self.pharmacy_id
            .as_deref()
            .ok_or_else(|| AppError::Unauthorized("User is not attached to a pharmacy".into()))
    }

    pub fn branch_scope(&self) -> Result<BranchScope, AppError> {
        let branch_name = self
            .branch
            .clone()
            .ok_or_else(|| AppError::BadRequest("No branch selected".into()))?;

        Ok(BranchScope {
            pharmacy_id: self.pharmacy_id()?.to_string(),
            branch_name,
        })
    }

    pub fn ensure_pharmacy_admin(&self) -> Result<(), AppError> {
        if self.is_pharmacy_admin() {
            Ok(())
        } else {
            Err(AppError::ForbiddenResource(
                "Only pharmacy admins can perform this action".into(),
            ))
        }
    }
}

pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        decode::<Claims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| AppError::Unauthorized(format!("Invalid token: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};

    fn claims(role: UserRole) -> Claims {
        Claims {
            sub: "uid-1".into(),
            email: Some("owner@example.com".into()),
            role,
            pharmacy_id: Some("pharmacy-9".into()),
            branch: Some("Downtown".into()),
            exp: 4_102_444_800,
        }
    }

    #[test]
    fn admin_pharmacy_is_own_uid() {
        let user = CurrentUser::from_claims(claims(UserRole::PharmacyAdmin), None);
        assert_eq!(user.pharmacy_id().unwrap(), "uid-1");
        assert!(user.is_pharmacy_admin());
        assert!(!user.can_return_to_admin());
    }

    #[test]
    fn manager_pharmacy_comes_from_claims() {
        let user = CurrentUser::from_claims(claims(UserRole::BranchManager), None);
        assert_eq!(user.pharmacy_id().unwrap(), "pharmacy-9");
        assert_eq!(
            user.branch_scope().unwrap(),
            BranchScope {
                pharmacy_id: "pharmacy-9".into(),
                branch_name: "Downtown".into(),
            }
        );
    }

    #[test]
    fn admin_acting_as_branch_keeps_admin_pharmacy() {
        let user = CurrentUser::from_claims(
            claims(UserRole::PharmacyAdmin),
            Some("Uptown".into()),
        );
        assert!(user.is_branch_manager());
        assert!(user.can_return_to_admin());
        assert_eq!(user.pharmacy_id().unwrap(), "uid-1");
        assert_eq!(user.branch.as_deref(), Some("Uptown"));
        assert!(user.ensure_pharmacy_admin().is_err());
    }

    #[test]
    fn managers_cannot_switch_branches() {
        let user = CurrentUser::from_claims(
            claims(UserRole::BranchManager),
            Some("Uptown".into()),
        );
        assert_eq!(user.branch.as_deref(), Some("Downtown"));
        assert!(user.admin.is_none());
    }

    #[test]
    fn admin_without_branch_has_no_branch_scope() {
        let mut c = claims(UserRole::PharmacyAdmin);
        c.branch = None;
        let user = CurrentUser::from_claims(c, Some("   ".into()));
        assert!(matches!(user.branch_scope(), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn verifies_tokens_signed_with_shared_secret() {
        let token = encode(
            &Header::default(),
            &claims(UserRole::BranchManager),
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();

        let verified = TokenVerifier::new("secret").verify(&token).unwrap();
        assert_eq!(verified.sub, "uid-1");
        assert!(TokenVerifier::new("other").verify(&token).is_err());
    }
}

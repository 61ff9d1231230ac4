//! Role-based route access.
//!
//! Decides, from the current session alone, whether a client route may be
//! shown, must bounce to login, or is forbidden for the user's role.

use super::AuthStatus;

/// Outcome of a route access check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAccess {
    /// Render the route.
    Allow,
    /// No session; send the user to `/login`.
    RedirectToLogin,
    /// Signed in, but the role may not see this area; send to `/not-authorized`.
    NotAuthorized,
}

impl RouteAccess {
    /// Where to send the user instead, if anywhere.
    #[must_use]
    pub const fn redirect_target(self) -> Option<&'static str> {
        match self {
            Self::Allow => None,
            Self::RedirectToLogin => Some("/login"),
            Self::NotAuthorized => Some("/not-authorized"),
        }
    }
}

/// Check whether `path` may be visited with the given session.
#[must_use]
pub fn route_access(path: &str, status: &AuthStatus) -> RouteAccess {
    if path == "/login" || path == "/register" {
        return RouteAccess::Allow;
    }

    let AuthStatus::Authenticated(user) = status else {
        return RouteAccess::RedirectToLogin;
    };

    if path.starts_with("/vendor") && !path.contains("/onboarding") {
        if !user.role.can_access_vendor_area() {
            return RouteAccess::NotAuthorized;
        }
    } else if path.starts_with("/admin") && !user.role.can_access_admin_area() {
        return RouteAccess::NotAuthorized;
    }

    RouteAccess::Allow
}

#[cfg(test)]
mod tests {
    use marketplace_core::{UserId, UserRole};

    use super::*;
    use crate::auth::AuthUser;

    fn signed_in(role: UserRole) -> AuthStatus {
        AuthStatus::Authenticated(AuthUser {
            id: UserId::new("u1"),
            email: None,
            role,
        })
    }

    #[test]
    fn test_login_pages_always_allowed() {
        assert_eq!(route_access("/login", &AuthStatus::Anonymous), RouteAccess::Allow);
        assert_eq!(route_access("/register", &AuthStatus::Anonymous), RouteAccess::Allow);
    }

    #[test]
    fn test_anonymous_redirects_to_login() {
        let access = route_access("/vendor/products", &AuthStatus::Anonymous);
        assert_eq!(access, RouteAccess::RedirectToLogin);
        assert_eq!(access.redirect_target(), Some("/login"));
    }

    #[test]
    fn test_vendor_area() {
        assert_eq!(
            route_access("/vendor/dashboard", &signed_in(UserRole::Customer)),
            RouteAccess::NotAuthorized
        );
        assert_eq!(
            route_access("/vendor/dashboard", &signed_in(UserRole::Vendor)),
            RouteAccess::Allow
        );
        // Onboarding is open to any signed-in user
        assert_eq!(
            route_access("/vendor/onboarding", &signed_in(UserRole::Customer)),
            RouteAccess::Allow
        );
    }

    #[test]
    fn test_admin_area() {
        assert_eq!(
            route_access("/admin/vendor-applications", &signed_in(UserRole::Vendor)),
            RouteAccess::NotAuthorized
        );
        assert_eq!(
            route_access("/admin", &signed_in(UserRole::Super)),
            RouteAccess::Allow
        );
        assert_eq!(
            route_access("/admin", &signed_in(UserRole::Admin)).redirect_target(),
            None
        );
    }
}

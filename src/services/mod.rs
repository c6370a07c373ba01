pub mod auth_service;
pub use auth_service::{AuthError, AuthService, LoginCredentials, SessionAdmin};

pub mod auth_service_impl;
pub use auth_service_impl::DefaultAuthService;

pub mod authorization;
pub use authorization::RolePolicy;

pub mod identity;
pub use identity::{Identity, IdentityError, IdentityProvider, SignedIn};

pub mod password;

pub mod throttle;
pub use throttle::LoginThrottle;

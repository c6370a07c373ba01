pub mod firebase_auth;
pub mod firestore;
pub mod google_oauth;

pub use firebase_auth::FirebaseIdentityProvider;

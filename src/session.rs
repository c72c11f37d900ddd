//! The signed-in user's session.
//!
//! A `Session` owns the in-memory user and token, mirrors them into local
//! storage under `user` and `token`, and tells subscribers and the navigator
//! about every transition:
//!
//! ```text
//! Uninitialized -> Restoring -> Anonymous <-> Authenticated
//! ```
//!
//! Restoring trusts whatever user is stored; an expired token only shows up
//! on the next failed request. Logging out is local and does not revoke the
//! token on the backend.

use tracing::{error, info, warn};

use crate::api::ApiClient;
use crate::config::RoutesConfig;
use crate::error::{ClientError, Result};
use crate::models::{AuthResponse, Role, SignupRequest, UploadFile, User, UserUpdate};
use crate::storage::{Stored, TOKEN_KEY, USER_KEY};
use crate::user;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Restoring,
    Anonymous,
    Authenticated,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged(SessionState),
    UserChanged(Option<User>),
}

pub trait Navigator: Send + Sync {
    fn navigate(&self, route: &str);
}

/// Navigator for headless use; only records the route in the log.
pub struct LoggingNavigator;

impl Navigator for LoggingNavigator {
    fn navigate(&self, route: &str) {
        info!("Navigating to {}", route);
    }
}

type Observer = Box<dyn Fn(&SessionEvent) + Send + Sync>;

pub struct Session {
    api: ApiClient,
    navigator: Box<dyn Navigator>,
    routes: RoutesConfig,
    state: SessionState,
    user: Option<User>,
    token: Option<String>,
    observers: Vec<Observer>,
}

impl Session {
    pub fn new(api: ApiClient, navigator: Box<dyn Navigator>, routes: RoutesConfig) -> Self {
        Self {
            api,
            navigator,
            routes,
            state: SessionState::Uninitialized,
            user: None,
            token: None,
            observers: Vec::new(),
        }
    }

    pub fn subscribe<F>(&mut self, observer: F)
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.observers.push(Box::new(observer));
    }

    fn emit(&self, event: SessionEvent) {
        for observer in &self.observers {
            observer(&event);
        }
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            self.state = state;
            self.emit(SessionEvent::StateChanged(state));
        }
    }

    fn set_user(&mut self, user: Option<User>) {
        self.user = user;
        self.emit(SessionEvent::UserChanged(self.user.clone()));
    }

    /// Loads the stored session. Runs once; later calls are ignored.
    pub fn restore(&mut self) -> SessionState {
        if self.state != SessionState::Uninitialized {
            return self.state;
        }
        self.set_state(SessionState::Restoring);

        let storage = self.api.storage();
        self.token = storage
            .get::<String>(TOKEN_KEY)
            .map(Stored::into_string)
            .filter(|token| !token.is_empty());

        let user = match storage.get::<User>(USER_KEY) {
            Some(Stored::Decoded(user)) => Some(user),
            Some(Stored::Raw(_)) => {
                warn!("Stored user could not be decoded; starting anonymous");
                None
            }
            None => None,
        };

        match user {
            Some(user) => {
                info!("Restored session for user {}", user.id);
                self.set_user(Some(user));
                self.set_state(SessionState::Authenticated);
            }
            None => self.set_state(SessionState::Anonymous),
        }

        self.state
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == SessionState::Authenticated
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    fn start(&mut self, auth: AuthResponse) -> User {
        let storage = self.api.storage();
        if !storage.set_raw(TOKEN_KEY, &auth.jwt) {
            warn!("Token was not persisted; session will not survive a restart");
        }
        if !storage.set(USER_KEY, &auth.user) {
            warn!("User was not persisted; session will not survive a restart");
        }

        self.token = Some(auth.jwt);
        self.set_user(Some(auth.user.clone()));
        self.set_state(SessionState::Authenticated);
        self.navigator.navigate(&self.routes.authenticated_landing);

        auth.user
    }

    pub async fn login(&mut self, identifier: &str, password: &str) -> Result<User> {
        let auth = user::login(&self.api, identifier, password)
            .await
            .map_err(|e| {
                error!("Login failed for {}: {}", identifier, e);
                e
            })?;
        Ok(self.start(auth))
    }

    pub async fn signup(&mut self, request: &SignupRequest) -> Result<User> {
        let auth = user::signup(&self.api, request).await.map_err(|e| {
            error!("Signup failed for {}: {}", request.email, e);
            e
        })?;
        Ok(self.start(auth))
    }

    pub fn logout(&mut self) {
        let storage = self.api.storage();
        for key in [USER_KEY, TOKEN_KEY] {
            if !storage.remove(key) {
                warn!("'{}' was not removed from storage; a restart may restore it", key);
            }
        }

        if let Some(user) = &self.user {
            info!("Logged out user {}", user.id);
        }
        self.token = None;
        self.set_user(None);
        self.set_state(SessionState::Anonymous);
        self.navigator.navigate(&self.routes.public_landing);
    }

    fn current_user_id(&self) -> Result<i64> {
        self.user
            .as_ref()
            .map(|u| u.id)
            .ok_or_else(|| ClientError::Precondition("no user is signed in".to_string()))
    }

    /// Writes `user` to storage and only then adopts it in memory.
    fn replace_user(&mut self, user: User) -> Result<User> {
        if !self.api.storage().set(USER_KEY, &user) {
            return Err(ClientError::Persist(format!("user {}", user.id)));
        }
        self.set_user(Some(user.clone()));
        Ok(user)
    }

    pub async fn update_user(&mut self, update: &UserUpdate) -> Result<User> {
        let user_id = self.current_user_id()?;
        let updated = user::update_user(&self.api, user_id, update).await?;
        self.replace_user(updated)
    }

    pub async fn update_avatar(&mut self, file: UploadFile) -> Result<User> {
        let user_id = self.current_user_id()?;
        let updated = user::update_avatar(&self.api, user_id, file).await?;
        self.replace_user(updated)
    }

    /// Re-reads the signed-in user from the backend.
    pub async fn refresh_user(&mut self) -> Result<User> {
        self.current_user_id()?;
        let fresh = user::fetch_me(&self.api).await?;
        self.replace_user(fresh)
    }

    // Role checks read the stored user, not `self.user`.
    fn stored_role(&self) -> Option<Role> {
        self.api
            .storage()
            .get::<User>(USER_KEY)
            .and_then(Stored::decoded)
            .map(|u| u.role_type)
    }

    pub fn is_admin(&self) -> bool {
        self.stored_role().is_some_and(Role::is_admin)
    }

    pub fn is_student(&self) -> bool {
        self.stored_role().is_some_and(Role::is_student)
    }

    pub fn is_teacher(&self) -> bool {
        self.stored_role().is_some_and(Role::is_teacher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{count_events, RecordingTransport};
    use crate::models::MediaFile;
    use crate::storage::LocalStorage;
    use serde_json::json;
    use std::sync::atomic::Ordering;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;
    use tracing::Level;

    #[derive(Clone, Default)]
    struct RecordingNavigator(Arc<Mutex<Vec<String>>>);

    impl Navigator for RecordingNavigator {
        fn navigate(&self, route: &str) {
            self.0.lock().unwrap().push(route.to_string());
        }
    }

    struct Fixture {
        _dir: TempDir,
        storage: LocalStorage,
        transport: Arc<RecordingTransport>,
        routes: RecordingNavigator,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let storage = LocalStorage::new(dir.path().join("session.db").to_str().unwrap());
            Self {
                _dir: dir,
                storage,
                transport: RecordingTransport::new(),
                routes: RecordingNavigator::default(),
            }
        }

        /// No local store at all; every write reports failure.
        fn without_store() -> Self {
            Self {
                storage: LocalStorage::unavailable(),
                ..Self::new()
            }
        }

        fn session(&self) -> Session {
            let api = ApiClient::new(self.transport.clone(), self.storage.clone());
            Session::new(api, Box::new(self.routes.clone()), RoutesConfig::default())
        }

        fn navigations(&self) -> Vec<String> {
            self.routes.0.lock().unwrap().clone()
        }
    }

    fn user(role: Role) -> User {
        User {
            id: 7,
            email: "ana@example.org".to_string(),
            username: "ana".to_string(),
            display_name: Some("Ana".to_string()),
            role_type: role,
            profile_image: None,
        }
    }

    #[test]
    fn restores_authenticated_from_storage() {
        let fx = Fixture::new();
        fx.storage.set(USER_KEY, &user(Role::Student));
        fx.storage.set_raw(TOKEN_KEY, "tok");

        let mut session = fx.session();
        assert_eq!(session.state(), SessionState::Uninitialized);
        assert_eq!(session.restore(), SessionState::Authenticated);
        assert!(session.is_authenticated());
        assert_eq!(session.token(), Some("tok"));
        assert_eq!(session.user().unwrap().id, 7);
        assert!(fx.transport.requests().is_empty());
    }

    #[test]
    fn restores_anonymous_with_empty_storage() {
        let fx = Fixture::new();
        let mut session = fx.session();

        assert_eq!(session.restore(), SessionState::Anonymous);
        assert!(!session.is_authenticated());
        assert!(session.user().is_none());
    }

    #[test]
    fn undecodable_user_restores_anonymous() {
        let fx = Fixture::new();
        fx.storage.set_raw(USER_KEY, "{not json");

        let mut session = fx.session();
        assert_eq!(session.restore(), SessionState::Anonymous);
    }

    #[test]
    fn restore_passes_through_restoring_and_notifies() {
        let fx = Fixture::new();
        fx.storage.set(USER_KEY, &user(Role::Teacher));
        let events = Arc::new(Mutex::new(Vec::new()));

        let mut session = fx.session();
        let sink = events.clone();
        session.subscribe(move |e| sink.lock().unwrap().push(e.clone()));
        session.restore();

        let events = events.lock().unwrap();
        assert_eq!(events[0], SessionEvent::StateChanged(SessionState::Restoring));
        assert_eq!(events[1], SessionEvent::UserChanged(Some(user(Role::Teacher))));
        assert_eq!(events[2], SessionEvent::StateChanged(SessionState::Authenticated));
    }

    #[test]
    fn logout_clears_storage_and_navigates_home() {
        let fx = Fixture::new();
        fx.storage.set(USER_KEY, &user(Role::Student));
        fx.storage.set_raw(TOKEN_KEY, "tok");

        let mut session = fx.session();
        session.restore();
        session.logout();

        assert!(!session.is_authenticated());
        assert_eq!(session.state(), SessionState::Anonymous);
        assert!(fx.storage.get_raw(USER_KEY).is_none());
        assert!(fx.storage.get_raw(TOKEN_KEY).is_none());
        assert_eq!(fx.navigations(), vec!["/".to_string()]);
        assert!(fx.transport.requests().is_empty());
    }

    #[tokio::test]
    async fn login_persists_and_navigates_to_dashboard() {
        let fx = Fixture::new();
        fx.transport.respond(
            200,
            json!({ "jwt": "fresh", "user": serde_json::to_value(user(Role::Admin)).unwrap() }),
        );

        let mut session = fx.session();
        session.restore();
        let logged_in = session.login("ana", "pw").await.unwrap();
        assert_eq!(logged_in.id, 7);

        assert!(session.is_authenticated());
        assert_eq!(fx.storage.get_raw(TOKEN_KEY).as_deref(), Some("fresh"));
        assert_eq!(
            fx.storage.get::<User>(USER_KEY).and_then(Stored::decoded),
            Some(user(Role::Admin))
        );
        assert_eq!(fx.navigations(), vec!["/dashboard".to_string()]);
    }

    #[tokio::test]
    async fn failed_login_stays_anonymous() {
        let fx = Fixture::new();
        fx.transport.respond(
            400,
            json!({ "error": { "status": 400, "message": "Invalid identifier or password" } }),
        );

        let mut session = fx.session();
        session.restore();
        let err = session.login("ana", "bad").await.unwrap_err();

        assert!(matches!(err, ClientError::Api { status: 400, .. }));
        assert_eq!(session.state(), SessionState::Anonymous);
        assert!(fx.storage.keys().is_empty());
        assert!(fx.navigations().is_empty());
    }

    #[tokio::test]
    async fn signup_authenticates() {
        let fx = Fixture::new();
        fx.transport.respond(
            200,
            json!({ "jwt": "new", "user": serde_json::to_value(user(Role::Student)).unwrap() }),
        );

        let mut session = fx.session();
        session.restore();
        session
            .signup(&SignupRequest {
                username: "ana".to_string(),
                email: "ana@example.org".to_string(),
                password: "pw".to_string(),
                display_name: None,
            })
            .await
            .unwrap();

        assert!(session.is_authenticated());
        assert_eq!(fx.transport.requests()[0].path, "/api/auth/local/register");
    }

    #[tokio::test]
    async fn update_without_user_fails_before_network() {
        let fx = Fixture::new();
        let mut session = fx.session();
        session.restore();

        let err = session.update_user(&UserUpdate::default()).await.unwrap_err();
        assert!(matches!(err, ClientError::Precondition(_)));

        let err = session
            .update_avatar(UploadFile::new("me.png", vec![1]))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Precondition(_)));
        assert!(fx.transport.requests().is_empty());
    }

    #[tokio::test]
    async fn update_user_replaces_memory_and_storage() {
        let fx = Fixture::new();
        fx.storage.set(USER_KEY, &user(Role::Student));
        fx.storage.set_raw(TOKEN_KEY, "tok");
        let mut renamed = user(Role::Student);
        renamed.display_name = Some("Ana B.".to_string());
        fx.transport.respond(200, serde_json::to_value(&renamed).unwrap());

        let mut session = fx.session();
        session.restore();
        let update = UserUpdate {
            display_name: Some("Ana B.".to_string()),
            ..UserUpdate::default()
        };
        session.update_user(&update).await.unwrap();

        assert_eq!(session.user(), Some(&renamed));
        assert_eq!(
            fx.storage.get::<User>(USER_KEY).and_then(Stored::decoded),
            Some(renamed)
        );
        let request = &fx.transport.requests()[0];
        assert_eq!(request.path, "/api/users/7");
        assert_eq!(request.bearer.as_deref(), Some("tok"));
    }

    #[tokio::test]
    async fn failed_update_keeps_previous_user() {
        let fx = Fixture::new();
        fx.storage.set(USER_KEY, &user(Role::Student));
        fx.transport.respond(500, json!({ "error": { "message": "down" } }));

        let mut session = fx.session();
        session.restore();
        assert!(session.update_user(&UserUpdate::default()).await.is_err());

        assert_eq!(session.user(), Some(&user(Role::Student)));
        assert!(session.is_authenticated());
    }

    #[test]
    fn role_predicates_follow_stored_user() {
        let fx = Fixture::new();
        fx.storage.set(USER_KEY, &user(Role::Admin));

        let mut session = fx.session();
        session.restore();
        assert!(session.is_admin());
        assert!(!session.is_student());
        assert!(!session.is_teacher());

        // Stored copy wins over the in-memory user.
        fx.storage.set(USER_KEY, &user(Role::Teacher));
        assert!(session.is_teacher());
        assert!(!session.is_admin());
        assert_eq!(session.user().unwrap().role_type, Role::Admin);
    }

    #[test]
    fn role_predicates_are_false_when_anonymous() {
        let fx = Fixture::new();
        let mut session = fx.session();
        session.restore();

        assert!(!session.is_admin());
        assert!(!session.is_student());
        assert!(!session.is_teacher());
    }

    #[tokio::test]
    async fn refresh_user_replaces_stored_profile() {
        let fx = Fixture::new();
        fx.storage.set(USER_KEY, &user(Role::Student));
        fx.storage.set_raw(TOKEN_KEY, "tok");
        let mut fresh = user(Role::Teacher);
        fresh.display_name = Some("Prof. Ana".to_string());
        fx.transport.respond(200, serde_json::to_value(&fresh).unwrap());

        let mut session = fx.session();
        session.restore();
        let refreshed = session.refresh_user().await.unwrap();

        assert_eq!(refreshed, fresh);
        assert_eq!(session.user(), Some(&fresh));
        assert!(session.is_teacher());
        let request = &fx.transport.requests()[0];
        assert_eq!(request.path, "/api/users/me");
        assert_eq!(request.bearer.as_deref(), Some("tok"));
    }

    #[tokio::test]
    async fn update_avatar_persists_new_image() {
        let fx = Fixture::new();
        fx.storage.set(USER_KEY, &user(Role::Student));
        fx.storage.set_raw(TOKEN_KEY, "tok");
        fx.transport
            .respond(200, json!([{ "id": 41, "name": "me.png", "url": "/u/me.png" }]));
        let mut with_avatar = user(Role::Student);
        with_avatar.profile_image = Some(MediaFile {
            id: 41,
            name: "me.png".to_string(),
            url: "/u/me.png".to_string(),
        });
        fx.transport
            .respond(200, serde_json::to_value(&with_avatar).unwrap());

        let mut session = fx.session();
        session.restore();
        session
            .update_avatar(UploadFile::new("me.png", vec![0x89]))
            .await
            .unwrap();

        assert_eq!(session.user(), Some(&with_avatar));
        assert_eq!(
            fx.storage.get::<User>(USER_KEY).and_then(Stored::decoded),
            Some(with_avatar)
        );
        let requests = fx.transport.requests();
        assert_eq!(requests[0].path, "/api/upload");
        assert_eq!(requests[1].path, "/api/users/7");
    }

    #[tokio::test]
    async fn login_without_store_still_authenticates() {
        let fx = Fixture::without_store();
        fx.transport.respond(
            200,
            json!({ "jwt": "fresh", "user": serde_json::to_value(user(Role::Student)).unwrap() }),
        );
        let mut renamed = user(Role::Student);
        renamed.display_name = Some("Ana B.".to_string());
        fx.transport.respond(200, serde_json::to_value(&renamed).unwrap());

        let (_guard, warnings) = count_events(Level::WARN);
        let mut session = fx.session();
        session.restore();
        session.login("ana", "pw").await.unwrap();

        assert!(session.is_authenticated());
        assert_eq!(session.token(), Some("fresh"));
        assert_eq!(fx.navigations(), vec!["/dashboard".to_string()]);
        assert_eq!(warnings.load(Ordering::SeqCst), 2);

        let update = UserUpdate {
            display_name: Some("Ana B.".to_string()),
            ..UserUpdate::default()
        };
        let err = session.update_user(&update).await.unwrap_err();
        assert!(matches!(err, ClientError::Persist(_)));
        assert_eq!(session.user(), Some(&user(Role::Student)));
    }

    #[tokio::test]
    async fn logout_without_store_warns_and_signs_out() {
        let fx = Fixture::without_store();
        fx.transport.respond(
            200,
            json!({ "jwt": "fresh", "user": serde_json::to_value(user(Role::Student)).unwrap() }),
        );
        let mut session = fx.session();
        session.restore();
        session.login("ana", "pw").await.unwrap();

        let (_guard, warnings) = count_events(Level::WARN);
        session.logout();

        assert_eq!(warnings.load(Ordering::SeqCst), 2);
        assert_eq!(session.state(), SessionState::Anonymous);
        assert!(session.user().is_none());
        assert_eq!(session.token(), None);
        assert_eq!(
            fx.navigations(),
            vec!["/dashboard".to_string(), "/".to_string()]
        );
    }
}

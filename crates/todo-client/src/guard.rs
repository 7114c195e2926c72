//! Client-side routes and the session guard that runs before one renders

use todo_common::auth::SessionView;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Home,
    Login,
    Dashboard,
    Todos,
    Ai,
}

impl Route {
    pub const ALL: [Route; 5] = [
        Route::Home,
        Route::Login,
        Route::Dashboard,
        Route::Todos,
        Route::Ai,
    ];

    pub fn path(self) -> &'static str {
        match self {
            Route::Home => "/",
            Route::Login => "/login",
            Route::Dashboard => "/dashboard",
            Route::Todos => "/todos",
            Route::Ai => "/ai",
        }
    }

    pub fn from_path(path: &str) -> Option<Route> {
        let path = path.split(['?', '#']).next().unwrap_or(path);
        let path = match path.trim_end_matches('/') {
            "" => "/",
            trimmed => trimmed,
        };
        Route::ALL.into_iter().find(|route| route.path() == path)
    }

    /// Only the dashboard is behind sign-in
    pub fn requires_session(self) -> bool {
        matches!(self, Route::Dashboard)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Render,
    Redirect(Route),
}

/// Decide whether `route` may render for `session`; signed-out visitors of a
/// protected route go to the login page.
pub fn guard(route: Route, session: Option<&SessionView>) -> Navigation {
    if route.requires_session() && session.is_none() {
        Navigation::Redirect(Route::Login)
    } else {
        Navigation::Render
    }
}

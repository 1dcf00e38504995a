//! Small declarative helpers shared by the HTTP apps

#[cfg(feature = "actix")]
pub use actix_web;

/// Generate a `routes` function registering handlers and nested route modules
///
/// ```ignore
/// macros_utils::routes! {
///     route health_route,
///     scope "/api" => api,
/// }
/// ```
///
/// `route` registers a handler declared with an actix routing attribute,
/// `scope` mounts another module's `routes` under a path prefix.
#[cfg(feature = "actix")]
#[macro_export]
macro_rules! routes {
    ($($body:tt)*) => {
        pub fn routes(cfg: &mut $crate::actix_web::web::ServiceConfig) {
            $crate::__route_entries!(cfg; $($body)*);
        }
    };
}

#[cfg(feature = "actix")]
#[doc(hidden)]
#[macro_export]
macro_rules! __route_entries {
    ($cfg:ident;) => {};

    ($cfg:ident; route $handler:ident $(, $($rest:tt)*)?) => {
        $cfg.service($handler);
        $crate::__route_entries!($cfg; $($($rest)*)?);
    };

    ($cfg:ident; scope $prefix:literal => $module:ident $(, $($rest:tt)*)?) => {
        $cfg.service($crate::actix_web::web::scope($prefix).configure($module::routes));
        $crate::__route_entries!($cfg; $($($rest)*)?);
    };
}

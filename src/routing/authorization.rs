//! Method allow-list per resource.

use axum::http::Method;

use super::resource::Resource;

/// Computer records can be read and updated; file uploads only accept `PUT`.
fn allowed_methods(resource: Resource) -> &'static [Method] {
    const READ_UPDATE: &[Method] = &[Method::GET, Method::PUT];
    const UPDATE: &[Method] = &[Method::PUT];

    match resource {
        Resource::ComputerById
        | Resource::ComputerByName
        | Resource::ComputerBySerialNumber
        | Resource::ComputerByUdid
        | Resource::ComputerByMacAddress => READ_UPDATE,
        Resource::FileUploadById | Resource::FileUploadByName => UPDATE,
    }
}

/// Pure lookup against the static authorization table.
#[derive(Debug, Clone, Copy, Default)]
pub struct MethodAuthorizer;

impl MethodAuthorizer {
    /// Create an authorizer over the built-in table.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Whether `method` is permitted on `resource`.
    #[must_use]
    pub fn is_allowed(&self, method: &Method, resource: Resource) -> bool {
        allowed_methods(resource).contains(method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computer_resources_allow_get_and_put() {
        let auth = MethodAuthorizer::new();
        for resource in &Resource::ALL[..5] {
            assert!(auth.is_allowed(&Method::GET, *resource), "{resource}");
            assert!(auth.is_allowed(&Method::PUT, *resource), "{resource}");
        }
    }

    #[test]
    fn file_uploads_allow_put_only() {
        let auth = MethodAuthorizer::new();
        for resource in [Resource::FileUploadById, Resource::FileUploadByName] {
            assert!(auth.is_allowed(&Method::PUT, resource));
            assert!(!auth.is_allowed(&Method::GET, resource));
            assert!(!auth.is_allowed(&Method::POST, resource));
        }
    }

    #[test]
    fn destructive_and_other_methods_are_denied_everywhere() {
        let auth = MethodAuthorizer::new();
        for resource in Resource::ALL {
            for method in [
                Method::DELETE,
                Method::POST,
                Method::PATCH,
                Method::HEAD,
                Method::OPTIONS,
            ] {
                assert!(!auth.is_allowed(&method, resource), "{method} {resource}");
            }
        }
    }
}

mod client;

pub use client::{
    AlfrescoClient, AlfrescoError, ApiErrorClass, ContentInfo, Credentials, DOCUMENT_LIBRARY,
    Node, Page, Pagination, PathElement, PathInfo, Site, SiteContainer, SiteMembership,
};

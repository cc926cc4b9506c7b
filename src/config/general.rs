#[derive(Debug, confique::Config)]
pub(crate) struct GeneralConfig {
    /// The title of the blog this instance serves. Shown on the plain index
    /// route and used in log output.
    pub(crate) site_title: String,
}

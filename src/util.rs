/// An empty `enum` for signaling the fact that a function (potentially) never
/// returns. Note that you can't construct a value of this type, so a function
/// returning it can never return. A function returning `Result<Never>` never
/// returns when it succeeds, but it might still fail.
pub(crate) enum Never {}

/// Pull the structured block out of free model text.
///
/// Permissive on purpose: everything from the first `{` to the last `}`
/// inclusive, whatever prose surrounds it. With several blocks this spans
/// all of them, and the caller's parse then decides. `None` when there is
/// no `{`, no `}`, or the last `}` comes before the first `{`.
pub fn extract_structured_block(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

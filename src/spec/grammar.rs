#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

peg::parser! {
    /// Grammars for the `tag: value` lines found in specification files.
    pub grammar line() for str {
        /// matches any run of characters other than a colon
        rule no_colon() -> &'input str
            = s:$([^ ':']*) { s }

        /// matches the rest of the line
        rule rest() -> &'input str
            = s:$([_]*) { s }

        /// parses an annotation, `@tag: value`, splitting on the first colon;
        /// both sides are trimmed
        pub rule annotation() -> (&'input str, &'input str)
            = "@" tag:no_colon() ":" value:rest()
            { (tag.trim(), value.trim()) }

        /// parses a body line, `tag: value`, that contains exactly one colon;
        /// both sides are trimmed
        pub rule tag_value() -> (&'input str, &'input str)
            = tag:no_colon() ":" value:no_colon()
            { (tag.trim(), value.trim()) }
    }
}

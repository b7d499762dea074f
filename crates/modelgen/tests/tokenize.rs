use modelgen::{tokenize, TokenKind};
use pretty_assertions::assert_eq;

/// Concatenating the source slices of significant tokens reconstructs the
/// significant content of the source.
#[test]
fn significant_slices_reconstruct_source() {
    let source = "x = 1 + 2  # comment\ny = \"a b\"\n";
    let tokens = tokenize(source, "<test>").unwrap();

    let significant: String = tokens
        .iter()
        .filter(|t| {
            !matches!(
                t.kind,
                TokenKind::Whitespace | TokenKind::Comment | TokenKind::Newline | TokenKind::Eof
            )
        })
        .map(|t| t.slice(source))
        .collect();
    assert_eq!(significant, "x=1+2y=\"a b\"");
}

#[test]
fn tokens_are_strictly_ordered_and_end_with_eof() {
    let source = "for i in 0:10\n    emit (i, 0, 0, 0, 0, 1)\n";
    let tokens = tokenize(source, "<test>").unwrap();

    for pair in tokens.windows(2) {
        assert!(pair[0].begin.offset <= pair[0].end.offset);
        assert!(pair[0].end.offset <= pair[1].begin.offset);
    }
    assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
    // Every token's span is within the source.
    assert!(tokens.iter().all(|t| t.end.offset <= source.len()));
}

#[test]
fn keywords_are_specialized_from_identifiers() {
    let source = "format null not forx";
    let tokens = tokenize(source, "<test>").unwrap();
    let kinds: Vec<TokenKind> = tokens
        .iter()
        .filter(|t| !t.kind.is_space())
        .map(|t| t.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            TokenKind::Name,
            TokenKind::Null,
            TokenKind::Not,
            TokenKind::Name,
            TokenKind::Eof
        ]
    );
}

#[test]
fn string_payload_excludes_quotes_and_decodes_escapes() {
    let tokens = tokenize("'it\\'s'", "<test>").unwrap();
    assert_eq!(tokens[0].kind, TokenKind::Str);
    assert_eq!(tokens[0].payload, modelgen::Payload::Str("it's".to_owned()));
    // The raw slice still carries the quotes for re-inspection.
    assert_eq!(tokens[0].slice("'it\\'s'"), "'it\\'s'");
}

#[test]
fn lexical_errors_are_positioned() {
    let err = tokenize("x = 'unterminated", "<test>").unwrap_err();
    assert_eq!(err.kind(), modelgen::ErrorKind::Lexical);
    let loc = err.loc().unwrap();
    assert_eq!((loc.line, loc.column), (1, 5));
}

use tagbooru::TagbooruError;
use tagbooru::ast::{Condition, Node};
use tagbooru::parse;

fn word(w: &str) -> Node {
    Node::word(w)
}

fn condition(and: Vec<Node>, or: Vec<Node>) -> Node {
    Node::Condition(Condition { and, or })
}

fn parse_error(query: &str) -> (String, &'static str, usize) {
    match parse(query) {
        Err(TagbooruError::Parse {
            token,
            context,
            offset,
        }) => (token, context, offset),
        other => panic!("expected parse error for {query:?}, got {other:?}"),
    }
}

#[test]
fn bare_words_are_and_terms() {
    assert_eq!(parse("a b").unwrap(), condition(vec![word("a"), word("b")], vec![]));
}

#[test]
fn tilde_moves_a_term_to_the_or_list() {
    assert_eq!(
        parse("a ~b ~c").unwrap(),
        condition(vec![word("a")], vec![word("b"), word("c")])
    );
    assert_eq!(parse("~~a").unwrap(), condition(vec![], vec![word("a")]));
}

#[test]
fn negations_wrap_words_and_groups() {
    assert_eq!(
        parse("-a ~-b").unwrap(),
        condition(
            vec![Node::negate(word("a"))],
            vec![Node::negate(word("b"))]
        )
    );
    assert_eq!(
        parse("-(( a b ))").unwrap(),
        condition(
            vec![Node::negate(condition(vec![word("a"), word("b")], vec![]))],
            vec![]
        )
    );
}

#[test]
fn groups_nest_and_the_outer_query_resumes() {
    assert_eq!(
        parse("(( a (( b ~c )) )) ~d e").unwrap(),
        condition(
            vec![
                condition(
                    vec![word("a"), condition(vec![word("b")], vec![word("c")])],
                    vec![]
                ),
                word("e"),
            ],
            vec![word("d")]
        )
    );
}

#[test]
fn symbols_are_recognised_inside_words() {
    assert_eq!(
        parse("a-b").unwrap(),
        condition(vec![word("a"), Node::negate(word("b"))], vec![])
    );
    assert_eq!(
        parse("x((y))").unwrap(),
        condition(vec![word("x"), condition(vec![word("y")], vec![])], vec![])
    );
}

#[test]
fn directives_are_plain_words_to_the_parser() {
    assert_eq!(
        parse("baseline:mine ~regex:^ca").unwrap(),
        condition(vec![word("baseline:mine")], vec![word("regex:^ca")])
    );
}

#[test]
fn empty_queries_parse_to_an_empty_condition() {
    for query in ["", "   ", "\t\n"] {
        assert_eq!(parse(query).unwrap(), condition(vec![], vec![]));
    }
}

#[test]
fn dangling_tilde_is_rejected() {
    let (token, context, offset) = parse_error("a ~");
    assert_eq!(token, "end of query");
    assert!(context.starts_with("or-term"));
    assert_eq!(offset, 3);

    let (token, context, _) = parse_error("(( a ~ ))");
    assert_eq!(token, "`))`");
    assert!(context.starts_with("or-term"));
}

#[test]
fn unterminated_group_is_rejected() {
    let (token, context, offset) = parse_error("(( a b");
    assert_eq!(token, "end of query");
    assert_eq!(context, "clause");
    assert_eq!(offset, 6);
}

#[test]
fn stray_close_is_rejected() {
    let (token, context, offset) = parse_error("a ))");
    assert_eq!(token, "`))`");
    assert_eq!(context, "query");
    assert_eq!(offset, 2);
}

#[test]
fn negation_needs_a_word_or_group() {
    for query in ["-", "- ~a", "a - ))", "--a"] {
        let (_, context, _) = parse_error(query);
        assert!(context.starts_with("negation"), "{query:?}: {context}");
    }
}

#[test]
fn display_reparses_to_the_same_tree() {
    for query in ["", "a", "a b ~c", "-a ~-(( b ~c ))", "(( a )) ~(( b ))", "x -(( y (( z )) ))"] {
        let tree = parse(query).unwrap();
        let reparsed = parse(&tree.to_string()).unwrap();
        assert_eq!(reparsed, condition(vec![tree], vec![]), "{query:?}");
    }
}

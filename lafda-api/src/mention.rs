use pest::Parser;

#[derive(pest_derive::Parser)]
#[grammar = "mention.pest"]
struct MentionParser;

/// Lists the users `@mentioned` in a comment, in order of first appearance
pub fn mentions(content: &str) -> Vec<String> {
    let mut res: Vec<String> = Vec::new();
    // the grammar accepts any input, text being a catch-all
    let content = match MentionParser::parse(Rule::content, content) {
        Ok(mut pairs) => match pairs.next() {
            Some(content) => content,
            None => return res,
        },
        Err(_) => return res,
    };
    for p in content.into_inner() {
        if p.as_rule() != Rule::mention {
            continue;
        }
        if let Some(handle) = p.into_inner().next() {
            let handle = handle.as_str();
            if !res.iter().any(|h| h == handle) {
                res.push(handle.to_string());
            }
        }
    }
    res
}

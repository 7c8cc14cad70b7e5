use once_cell::sync::Lazy;
use regex::Regex;
use std::{borrow::Cow, collections::HashSet};
use tui::style::Style;
use crate::palette::STYLE;

/*──── cohort DSL keyword set ─────────────────────────────────────*/
static KEYWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "SELECT", "FROM", "WHERE", "AND", "OR", "NOT", "IN", "BETWEEN", "LIKE", "ILIKE",
        "IS", "NULL", "TRUE", "FALSE", "LIMIT", "ORDER", "BY", "ASC", "DESC", "AS",
        "DISTINCT", "LAKEHOUSE",
    ]
    .into_iter()
    .collect()
});

/*──── compact regex for tokenising a single line ─────────────────*/
static TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"--[^\r\n]*|'(?:[^'\\]|\\.|'')*'?|"(?:[^"\\]|\\.|"")*"?|>=|<=|!=|<>|\b[0-9]+(?:\.[0-9]+)?|\b[A-Za-z_][A-Za-z0-9_]*|\s+|."#
    ).expect("token regex is valid")
});

/*──── line-crossing states ───────────────────────────────────────*/
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ParseState {
    Normal,
    InSingle,   // inside '…'
    InDouble,   // inside "…"
}

pub type Seg<'a> = (Cow<'a, str>, Style);

/*──── public: highlight a single line, update state ─────────────*/
pub fn highlight_line<'a>(line: &'a str, state: &mut ParseState) -> Vec<Seg<'a>> {
    let mut segs: Vec<Seg<'a>> = Vec::new();
    let mut start = 0usize;

    /*—— 1️⃣ finish a literal left open on the previous line ————————*/
    let open_quote = match *state {
        ParseState::InSingle => Some('\''),
        ParseState::InDouble => Some('"'),
        ParseState::Normal => None,
    };
    if let Some(q) = open_quote {
        match line.find(q) {
            Some(pos) => {
                segs.push((Cow::Borrowed(&line[..pos + 1]), STYLE::str_()));
                *state = ParseState::Normal;
                start = pos + 1;
            }
            None => {
                segs.push((Cow::Borrowed(line), STYLE::str_()));
                return segs;
            }
        }
    }

    /*—— 2️⃣ tokenise the remainder ——————————————————————————————*/
    let toks: Vec<&str> = TOKEN_RE
        .find_iter(&line[start..])
        .map(|m| &line[start + m.start()..start + m.end()])
        .collect();

    for (idx, tok) in toks.iter().copied().enumerate() {
        /* line comment  -- … */
        if tok.starts_with("--") {
            segs.push((Cow::Borrowed(tok), STYLE::cmt()));
            break;
        }

        /* quoted literal, possibly unterminated */
        if let Some(q) = tok.chars().next().filter(|c| *c == '\'' || *c == '"') {
            let closed = tok.len() > 1 && tok.ends_with(q) && !tok.ends_with("\\'");
            segs.push((Cow::Borrowed(tok), STYLE::str_()));
            if !closed {
                *state = if q == '\'' { ParseState::InSingle } else { ParseState::InDouble };
            }
            continue;
        }

        /* function  ident(  */
        if is_ident(tok) && toks.get(idx + 1) == Some(&"(") {
            segs.push((Cow::Borrowed(tok), STYLE::func()));
            continue;
        }

        /* number */
        if tok.starts_with(|c: char| c.is_ascii_digit()) {
            segs.push((Cow::Borrowed(tok), STYLE::num()));
            continue;
        }

        /* keyword */
        if KEYWORDS.contains(tok.to_ascii_uppercase().as_str()) {
            segs.push((Cow::Borrowed(tok), STYLE::kw()));
            continue;
        }

        segs.push((Cow::Borrowed(tok), STYLE::plain()));
    }
    segs
}

fn is_ident(tok: &str) -> bool {
    tok.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_of(segs: &[Seg<'_>]) -> String {
        segs.iter().map(|(s, _)| s.as_ref()).collect()
    }

    #[test]
    fn segments_cover_the_whole_line() {
        let line = "where concept = 'hba1c' and value >= 6.5 -- recent";
        let mut st = ParseState::Normal;
        let segs = highlight_line(line, &mut st);
        assert_eq!(text_of(&segs), line);
        assert_eq!(st, ParseState::Normal);
        assert!(segs.iter().any(|(s, style)| s == "where" && *style == STYLE::kw()));
        assert!(segs.iter().any(|(s, style)| s == "'hba1c'" && *style == STYLE::str_()));
        assert!(segs.iter().any(|(s, style)| s == "6.5" && *style == STYLE::num()));
    }

    #[test]
    fn open_literal_carries_to_next_line() {
        let mut st = ParseState::Normal;
        highlight_line("where note = 'multi", &mut st);
        assert_eq!(st, ParseState::InSingle);
        let segs = highlight_line("line' limit 5", &mut st);
        assert_eq!(st, ParseState::Normal);
        assert_eq!(segs[0].0, "line'");
    }
}

//! # Template Translation
//!
//! Templates are written with Go `text/template` actions (`{{ .env }}`,
//! `{{ sanitize .env }}`, `{{ .name | lower }}`). They are rewritten into
//! minijinja syntax before compilation.
//!
//! Supported:
//!
//! - field paths (`.a.b`), the dot (`.`), string, number and boolean literals, `nil`
//! - function calls, pipelines (the piped value becomes the last argument) and
//!   parenthesized sub-pipelines
//! - `if`, `else if`, `else`, `end`
//! - the builtins `not`, `and`, `or`, `eq`, `ne`, `lt`, `le`, `gt`, `ge`, `len`
//! - comments and `{{-`/`-}}` whitespace trimming
//!
//! `range`, `with`, `define`, `template`, `block` and variables are rejected.

use super::error::TranslateError;
use super::functions::FUNCTIONS;
use crate::controller::combine::ELEMENT_KEY;

/// Translated template source plus every field path it references
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translated {
    pub source: String,
    /// Field paths in order of appearance, as written (`.Element.env`)
    pub fields: Vec<Vec<String>>,
}

const UNSUPPORTED_ACTIONS: &[&str] = &[
    "range", "with", "define", "template", "block", "break", "continue",
];

/// Names minijinja reads as literals or operators rather than variables
const RESERVED_NAMES: &[&str] = &[
    "true", "false", "none", "True", "False", "None", "and", "or", "not", "in", "is", "if",
    "else",
];

fn is_reserved(segment: &str) -> bool {
    RESERVED_NAMES.contains(&segment)
}

/// Append `.segment`, or a subscript when the name would not parse as one
fn push_segment(expr: &mut String, segment: &str) {
    if is_reserved(segment) {
        expr.push_str(&format!("[\"{segment}\"]"));
    } else {
        expr.push('.');
        expr.push_str(segment);
    }
}

/// minijinja expression for a field path; the empty path is the element itself
fn field_expr(path: &[String]) -> String {
    let Some((first, rest)) = path.split_first() else {
        return ELEMENT_KEY.to_string();
    };
    // Top-level element keys are also reachable through the element
    let mut expr = if is_reserved(first) {
        format!("{ELEMENT_KEY}[\"{first}\"]")
    } else {
        first.clone()
    };
    for segment in rest {
        push_segment(&mut expr, segment);
    }
    expr
}

/// Rewrite Go template actions in `input` into minijinja syntax
pub fn translate(input: &str) -> Result<Translated, TranslateError> {
    let mut out = String::with_capacity(input.len());
    let mut fields = Vec::new();
    let mut open_ifs = 0usize;
    let mut rest = input;
    let mut offset = 0usize;

    while let Some(start) = rest.find("{{") {
        push_text(&mut out, &rest[..start]);
        let after_open = &rest[start + 2..];
        let len = action_len(after_open)
            .ok_or(TranslateError::UnclosedAction(offset + start))?;
        let action = &after_open[..len];
        translate_action(action, &mut out, &mut fields, &mut open_ifs)?;

        let consumed = start + 2 + len + 2;
        offset += consumed;
        rest = &rest[consumed..];
    }
    push_text(&mut out, rest);

    if open_ifs > 0 {
        return Err(TranslateError::MissingEnd(open_ifs));
    }
    Ok(Translated {
        source: out,
        fields,
    })
}

/// Copy literal text, hiding minijinja block and comment openers
fn push_text(out: &mut String, text: &str) {
    out.push_str(
        &text
            .replace("{%", "{{ \"{%\" }}")
            .replace("{#", "{{ \"{#\" }}"),
    );
}

/// Byte length of the action body up to its closing `}}`
fn action_len(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b'"' {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            b'`' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b'`' {
                    i += 1;
                }
            }
            b'/' if s[i..].starts_with("/*") => {
                i += s[i..].find("*/")? + 1;
            }
            b'}' if s[i..].starts_with("}}") => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

fn translate_action(
    action: &str,
    out: &mut String,
    fields: &mut Vec<Vec<String>>,
    open_ifs: &mut usize,
) -> Result<(), TranslateError> {
    let (trim_left, body) = match action.strip_prefix('-') {
        Some(b) if b.starts_with(char::is_whitespace) => ("-", b),
        _ => ("", action),
    };
    let (trim_right, body) = match body.strip_suffix('-') {
        Some(b) if b.ends_with(char::is_whitespace) => ("-", b),
        _ => ("", body),
    };
    let body = body.trim();

    if body.starts_with("/*") && body.ends_with("*/") {
        out.push_str(&format!("{{#{trim_left} {trim_right}#}}"));
        return Ok(());
    }

    let tokens = tokenize(body)?;
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        action: body,
        fields,
    };

    let block = |inner: &str| format!("{{%{trim_left} {inner} {trim_right}%}}");
    match tokens.first() {
        Some(Token::Ident(kw)) if kw == "if" => {
            parser.pos = 1;
            let cond = parser.pipeline()?;
            parser.expect_end()?;
            *open_ifs += 1;
            out.push_str(&block(&format!("if {cond}")));
        }
        Some(Token::Ident(kw)) if kw == "else" => {
            if *open_ifs == 0 {
                return Err(TranslateError::UnexpectedElse);
            }
            match tokens.get(1) {
                None => out.push_str(&block("else")),
                Some(Token::Ident(next)) if next == "if" => {
                    parser.pos = 2;
                    let cond = parser.pipeline()?;
                    parser.expect_end()?;
                    out.push_str(&block(&format!("elif {cond}")));
                }
                Some(other) => return Err(parser.unexpected(other)),
            }
        }
        Some(Token::Ident(kw)) if kw == "end" => {
            if tokens.len() > 1 {
                return Err(parser.unexpected(&tokens[1]));
            }
            *open_ifs = open_ifs.checked_sub(1).ok_or(TranslateError::UnexpectedEnd)?;
            out.push_str(&block("endif"));
        }
        Some(Token::Ident(kw)) if UNSUPPORTED_ACTIONS.contains(&kw.as_str()) => {
            return Err(TranslateError::UnsupportedAction(kw.clone()));
        }
        None => {
            return Err(TranslateError::UnexpectedToken {
                token: "}}".to_string(),
                action: body.to_string(),
            })
        }
        Some(_) => {
            let expr = parser.pipeline()?;
            parser.expect_end()?;
            out.push_str(&format!("{{{{{trim_left} {expr} {trim_right}}}}}"));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    /// `.a.b`; empty for the dot itself
    Field(Vec<String>),
    /// Field access chained onto a parenthesized group: `(...).a.b`
    Chain(Vec<String>),
    Ident(String),
    /// A string literal already in minijinja form
    Str(String),
    Number(String),
    LParen,
    RParen,
    Pipe,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Self::Field(path) => format!(".{}", path.join(".")),
            Self::Chain(path) => format!(").{}", path.join(".")),
            Self::Ident(s) | Self::Str(s) | Self::Number(s) => s.clone(),
            Self::LParen => "(".to_string(),
            Self::RParen => ")".to_string(),
            Self::Pipe => "|".to_string(),
        }
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn tokenize(body: &str) -> Result<Vec<Token>, TranslateError> {
    let chars: Vec<char> = body.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    let read_while = |start: usize, pred: fn(char) -> bool| -> usize {
        let mut end = start;
        while end < chars.len() && pred(chars[end]) {
            end += 1;
        }
        end
    };

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '|' => {
                tokens.push(Token::Pipe);
                i += 1;
            }
            '"' => {
                let mut end = i + 1;
                while end < chars.len() && chars[end] != '"' {
                    if chars[end] == '\\' {
                        end += 1;
                    }
                    end += 1;
                }
                if end >= chars.len() {
                    return Err(TranslateError::UnterminatedString(body.to_string()));
                }
                tokens.push(Token::Str(chars[i..=end].iter().collect()));
                i = end + 1;
            }
            '`' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&c| c == '`')
                    .map(|p| i + 1 + p)
                    .ok_or_else(|| TranslateError::UnterminatedString(body.to_string()))?;
                let raw: String = chars[i + 1..end].iter().collect();
                let quoted = serde_json::to_string(&raw)
                    .map_err(|_| TranslateError::UnterminatedString(body.to_string()))?;
                tokens.push(Token::Str(quoted));
                i = end + 1;
            }
            '.' => {
                let chained = matches!(tokens.last(), Some(Token::RParen))
                    && i > 0
                    && chars[i - 1] == ')';
                let mut path = Vec::new();
                while i < chars.len() && chars[i] == '.' {
                    let end = read_while(i + 1, is_ident_char);
                    if end == i + 1 {
                        i += 1;
                        break;
                    }
                    path.push(chars[i + 1..end].iter().collect());
                    i = end;
                }
                tokens.push(if chained {
                    Token::Chain(path)
                } else {
                    Token::Field(path)
                });
            }
            '$' => {
                let end = read_while(i + 1, is_ident_char);
                return Err(TranslateError::UnsupportedVariable(
                    chars[i..end].iter().collect(),
                ));
            }
            c if c.is_ascii_digit()
                || ((c == '-' || c == '+')
                    && chars.get(i + 1).is_some_and(char::is_ascii_digit)) =>
            {
                let end = read_while(i + 1, |c| c.is_ascii_alphanumeric() || c == '.' || c == '_');
                tokens.push(Token::Number(chars[i..end].iter().collect()));
                i = end;
            }
            c if is_ident_char(c) => {
                let end = read_while(i, is_ident_char);
                tokens.push(Token::Ident(chars[i..end].iter().collect()));
                i = end;
            }
            other => {
                return Err(TranslateError::UnexpectedToken {
                    token: other.to_string(),
                    action: body.to_string(),
                })
            }
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    action: &'a str,
    fields: &'a mut Vec<Vec<String>>,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn unexpected(&self, token: &Token) -> TranslateError {
        TranslateError::UnexpectedToken {
            token: token.describe(),
            action: self.action.to_string(),
        }
    }

    fn expect_end(&self) -> Result<(), TranslateError> {
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(self.unexpected(token)),
        }
    }

    fn at_command_end(&self) -> bool {
        matches!(self.peek(), None | Some(Token::Pipe) | Some(Token::RParen))
    }

    fn pipeline(&mut self) -> Result<String, TranslateError> {
        let mut expr = self.command(None)?;
        while matches!(self.peek(), Some(Token::Pipe)) {
            self.pos += 1;
            expr = self.command(Some(expr))?;
        }
        Ok(expr)
    }

    fn command(&mut self, piped: Option<String>) -> Result<String, TranslateError> {
        if let Some(Token::Ident(name)) = self.peek() {
            if !is_literal(name) {
                let name = name.clone();
                self.pos += 1;
                let mut args = Vec::new();
                while !self.at_command_end() {
                    args.push(self.operand()?);
                }
                args.extend(piped);
                return call(&name, args);
            }
        }

        let operand = self.operand()?;
        match (self.at_command_end(), piped) {
            (true, None) => Ok(operand),
            (_, Some(_)) => Err(TranslateError::UnexpectedToken {
                token: operand,
                action: self.action.to_string(),
            }),
            (false, None) => match self.peek() {
                Some(token) => Err(self.unexpected(token)),
                None => Ok(operand),
            },
        }
    }

    fn operand(&mut self) -> Result<String, TranslateError> {
        let Some(token) = self.peek().cloned() else {
            return Err(TranslateError::UnexpectedToken {
                token: "}}".to_string(),
                action: self.action.to_string(),
            });
        };
        self.pos += 1;

        match token {
            Token::Field(path) => {
                let expr = field_expr(&path);
                self.fields.push(path);
                Ok(expr)
            }
            Token::Str(s) | Token::Number(s) => Ok(s),
            Token::Ident(name) => match name.as_str() {
                "true" | "false" => Ok(name),
                "nil" => Ok("none".to_string()),
                _ => Err(self.unexpected(&Token::Ident(name))),
            },
            Token::LParen => {
                let inner = self.pipeline()?;
                match self.peek() {
                    Some(Token::RParen) => self.pos += 1,
                    Some(other) => return Err(self.unexpected(other)),
                    None => {
                        return Err(TranslateError::UnexpectedToken {
                            token: "}}".to_string(),
                            action: self.action.to_string(),
                        })
                    }
                }
                let mut expr = format!("({inner})");
                while let Some(Token::Chain(path)) = self.peek() {
                    for segment in path {
                        push_segment(&mut expr, segment);
                    }
                    self.pos += 1;
                }
                Ok(expr)
            }
            other => Err(self.unexpected(&other)),
        }
    }
}

fn is_literal(ident: &str) -> bool {
    matches!(ident, "true" | "false" | "nil")
}

fn arity(function: &str, args: &[String], expected: usize) -> Result<(), TranslateError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(TranslateError::ArgumentCount {
            function: function.to_string(),
            expected: expected.to_string(),
            actual: args.len(),
        })
    }
}

fn at_least(function: &str, args: &[String], min: usize) -> Result<(), TranslateError> {
    if args.len() >= min {
        Ok(())
    } else {
        Err(TranslateError::ArgumentCount {
            function: function.to_string(),
            expected: format!("at least {min}"),
            actual: args.len(),
        })
    }
}

/// Translate a call of a builtin or registered function
fn call(name: &str, args: Vec<String>) -> Result<String, TranslateError> {
    let binary = |op: &str, args: &[String]| -> Result<String, TranslateError> {
        arity(name, args, 2)?;
        Ok(format!("({} {op} {})", args[0], args[1]))
    };

    match name {
        "not" => {
            arity(name, &args, 1)?;
            Ok(format!("(not {})", args[0]))
        }
        "and" | "or" => {
            at_least(name, &args, 2)?;
            Ok(format!("({})", args.join(&format!(" {name} "))))
        }
        "eq" => {
            at_least(name, &args, 2)?;
            let first = &args[0];
            let alternatives: Vec<String> = args[1..]
                .iter()
                .map(|other| format!("{first} == {other}"))
                .collect();
            Ok(format!("({})", alternatives.join(" or ")))
        }
        "ne" => binary("!=", &args),
        "lt" => binary("<", &args),
        "le" => binary("<=", &args),
        "gt" => binary(">", &args),
        "ge" => binary(">=", &args),
        "len" => {
            arity(name, &args, 1)?;
            Ok(format!("({}|length)", args[0]))
        }
        f if FUNCTIONS.contains(&f) => Ok(format!("{f}({})", args.join(", "))),
        other => Err(TranslateError::UnknownFunction(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(input: &str) -> String {
        translate(input).unwrap().source
    }

    #[test]
    fn test_fields_and_dot() {
        assert_eq!(source("name: {{ .env }}-demo"), "name: {{ env }}-demo");
        assert_eq!(source("{{.Element.env}}"), "{{ Element.env }}");
        assert_eq!(source("{{ index . \"env\" }}"), "{{ index(Element, \"env\") }}");
    }

    #[test]
    fn test_calls_and_pipelines() {
        assert_eq!(source("{{ sanitize .env }}"), "{{ sanitize(env) }}");
        assert_eq!(source("{{ .env | lower | quote }}"), "{{ quote(lower(env)) }}");
        assert_eq!(
            source("{{ .replicas | default 1 }}"),
            "{{ default(1, replicas) }}"
        );
        assert_eq!(
            source("{{ upper (sanitize .team) }}"),
            "{{ upper((sanitize(team))) }}"
        );
        assert_eq!(source("{{ `raw \"x\"` }}"), "{{ \"raw \\\"x\\\"\" }}");
    }

    #[test]
    fn test_conditionals() {
        let out = source("{{ if eq .env \"prod\" }}3{{ else if .ha }}2{{ else }}1{{ end }}");
        assert_eq!(
            out,
            "{% if (env == \"prod\") %}3{% elif ha %}2{% else %}1{% endif %}"
        );
        assert_eq!(source("{{ if not .debug }}x{{ end }}"), "{% if (not debug) %}x{% endif %}");
    }

    #[test]
    fn test_trim_markers_and_comments() {
        assert_eq!(source("a {{- .env -}} b"), "a {{- env -}} b");
        assert_eq!(source("a {{/* note */}}b"), "a {# #}b");
        assert_eq!(source("{{- /* note */ -}}"), "{#- -#}");
        assert_eq!(source("{{-3}}"), "{{ -3 }}");
    }

    #[test]
    fn test_literal_jinja_syntax_is_escaped() {
        assert_eq!(source("a {% b %} {# c"), "a {{ \"{%\" }} b %} {{ \"{#\" }} c");
    }

    #[test]
    fn test_fields_are_collected() {
        let translated = translate("{{ .a.b }} {{ sanitize .Element.c }} {{ . }}").unwrap();
        assert_eq!(
            translated.fields,
            vec![
                vec!["a".to_string(), "b".to_string()],
                vec!["Element".to_string(), "c".to_string()],
                Vec::<String>::new(),
            ]
        );
    }

    #[test]
    fn test_rejections() {
        assert_eq!(
            translate("{{ range .items }}{{ end }}").unwrap_err(),
            TranslateError::UnsupportedAction("range".to_string())
        );
        assert_eq!(
            translate("{{ $x := 1 }}").unwrap_err(),
            TranslateError::UnsupportedVariable("$x".to_string())
        );
        assert_eq!(
            translate("{{ env \"HOME\" }}").unwrap_err(),
            TranslateError::UnknownFunction("env".to_string())
        );
        assert_eq!(translate("{{ .a").unwrap_err(), TranslateError::UnclosedAction(0));
        assert_eq!(translate("{{ end }}").unwrap_err(), TranslateError::UnexpectedEnd);
        assert_eq!(
            translate("{{ if .a }}x").unwrap_err(),
            TranslateError::MissingEnd(1)
        );
        assert!(matches!(
            translate("{{ .a .b }}").unwrap_err(),
            TranslateError::UnexpectedToken { .. }
        ));
    }

    #[test]
    fn test_reserved_names_are_subscripted() {
        assert_eq!(source("{{ .true }}"), "{{ Element[\"true\"] }}");
        assert_eq!(source("{{ .none.x }}"), "{{ Element[\"none\"].x }}");
        assert_eq!(source("{{ .flags.false }}"), "{{ flags[\"false\"] }}");
        assert_eq!(source("{{ (index . \"a\").in }}"), "{{ (index(Element, \"a\"))[\"in\"] }}");
    }

    #[test]
    fn test_braces_inside_strings() {
        assert_eq!(
            source("{{ default \"}}\" .x }}"),
            "{{ default(\"}}\", x) }}"
        );
    }
}

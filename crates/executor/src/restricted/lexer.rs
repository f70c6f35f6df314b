//! Tokenizer for the restricted scripting subset.
//!
//! Indentation-sensitive: `Indent`/`Dedent` tokens are synthesized from
//! leading whitespace, Python style. Tabs count as four columns.

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),

    True,
    False,
    NoneKw,
    If,
    Elif,
    Else,
    While,
    For,
    In,
    Break,
    Continue,
    And,
    Or,
    Not,

    Plus,
    Minus,
    Star,
    Slash,
    SlashSlash,
    Percent,
    StarStar,

    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,

    EqEq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,

    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,

    Newline,
    Indent,
    Dedent,
    Eof,
}

fn keyword(word: &str) -> Option<Tok> {
    Some(match word {
        "True" => Tok::True,
        "False" => Tok::False,
        "None" => Tok::NoneKw,
        "if" => Tok::If,
        "elif" => Tok::Elif,
        "else" => Tok::Else,
        "while" => Tok::While,
        "for" => Tok::For,
        "in" => Tok::In,
        "break" => Tok::Break,
        "continue" => Tok::Continue,
        "and" => Tok::And,
        "or" => Tok::Or,
        "not" => Tok::Not,
        _ => return None,
    })
}

/// Tokenize `source`, or report a message suitable for the error buffer.
pub fn tokenize(source: &str) -> Result<Vec<Tok>, String> {
    let mut tokens = Vec::new();
    let mut indents: Vec<usize> = vec![0];

    for (lineno, line) in source.lines().enumerate() {
        let lineno = lineno + 1;

        let mut width = 0usize;
        let mut rest = line;
        for c in line.chars() {
            match c {
                ' ' => width += 1,
                '\t' => width += 4,
                _ => break,
            }
            rest = &rest[c.len_utf8()..];
        }
        // blank and comment-only lines do not affect indentation
        if rest.is_empty() || rest.starts_with('#') {
            continue;
        }

        if width > *indents.last().unwrap() {
            indents.push(width);
            tokens.push(Tok::Indent);
        } else {
            while width < *indents.last().unwrap() {
                indents.pop();
                tokens.push(Tok::Dedent);
            }
            if width != *indents.last().unwrap() {
                return Err(format!("line {}: inconsistent indentation", lineno));
            }
        }

        tokenize_line(rest, lineno, &mut tokens)?;
        tokens.push(Tok::Newline);
    }

    while indents.len() > 1 {
        indents.pop();
        tokens.push(Tok::Dedent);
    }
    tokens.push(Tok::Eof);
    Ok(tokens)
}

fn tokenize_line(line: &str, lineno: usize, tokens: &mut Vec<Tok>) -> Result<(), String> {
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0usize;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' => {
                i += 1;
            }
            '#' => break,
            '\'' | '"' => {
                let quote = c;
                i += 1;
                let mut value = String::new();
                let mut closed = false;
                while i < chars.len() {
                    let c = chars[i];
                    if c == quote {
                        closed = true;
                        i += 1;
                        break;
                    }
                    if c == '\\' {
                        i += 1;
                        let esc = chars.get(i).copied().ok_or_else(|| {
                            format!("line {}: unterminated string", lineno)
                        })?;
                        value.push(match esc {
                            'n' => '\n',
                            't' => '\t',
                            'r' => '\r',
                            '\\' => '\\',
                            '\'' => '\'',
                            '"' => '"',
                            other => {
                                return Err(format!(
                                    "line {}: unsupported escape '\\{}'",
                                    lineno, other
                                ))
                            }
                        });
                    } else {
                        value.push(c);
                    }
                    i += 1;
                }
                if !closed {
                    return Err(format!("line {}: unterminated string", lineno));
                }
                tokens.push(Tok::Str(value));
            }
            '0'..='9' => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let mut is_float = false;
                if i < chars.len() && chars[i] == '.' {
                    is_float = true;
                    i += 1;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                if is_float {
                    let value = text
                        .parse::<f64>()
                        .map_err(|_| format!("line {}: invalid number '{}'", lineno, text))?;
                    tokens.push(Tok::Float(value));
                } else {
                    let value = text
                        .parse::<i64>()
                        .map_err(|_| format!("line {}: invalid number '{}'", lineno, text))?;
                    tokens.push(Tok::Int(value));
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(keyword(&word).unwrap_or(Tok::Ident(word)));
            }
            _ => {
                let next = chars.get(i + 1).copied();
                let (tok, width) = match (c, next) {
                    ('*', Some('*')) => (Tok::StarStar, 2),
                    ('/', Some('/')) => (Tok::SlashSlash, 2),
                    ('=', Some('=')) => (Tok::EqEq, 2),
                    ('!', Some('=')) => (Tok::NotEq, 2),
                    ('<', Some('=')) => (Tok::LtEq, 2),
                    ('>', Some('=')) => (Tok::GtEq, 2),
                    ('+', Some('=')) => (Tok::PlusAssign, 2),
                    ('-', Some('=')) => (Tok::MinusAssign, 2),
                    ('*', Some('=')) => (Tok::StarAssign, 2),
                    ('/', Some('=')) => (Tok::SlashAssign, 2),
                    ('+', _) => (Tok::Plus, 1),
                    ('-', _) => (Tok::Minus, 1),
                    ('*', _) => (Tok::Star, 1),
                    ('/', _) => (Tok::Slash, 1),
                    ('%', _) => (Tok::Percent, 1),
                    ('=', _) => (Tok::Assign, 1),
                    ('<', _) => (Tok::Lt, 1),
                    ('>', _) => (Tok::Gt, 1),
                    ('(', _) => (Tok::LParen, 1),
                    (')', _) => (Tok::RParen, 1),
                    ('[', _) => (Tok::LBracket, 1),
                    (']', _) => (Tok::RBracket, 1),
                    ('{', _) => (Tok::LBrace, 1),
                    ('}', _) => (Tok::RBrace, 1),
                    (',', _) => (Tok::Comma, 1),
                    (':', _) => (Tok::Colon, 1),
                    _ => {
                        return Err(format!("line {}: unexpected character '{}'", lineno, c))
                    }
                };
                tokens.push(tok);
                i += width;
            }
        }
    }
    Ok(())
}

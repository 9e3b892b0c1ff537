//! A small GBNF recognizer, enough to check that generated grammars accept
//! and reject the documents they should. It understands the subset of GBNF
//! the compiler emits: literals, character classes, groups, alternation and
//! the `? * + {n} {n,} {n,m}` repetitions.
#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap};

use json_gbnf::{GrammarOptions, JsonSchema, grammar_for_schema};
use serde_json::Value;

#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Vec<char>),
    Class { negated: bool, ranges: Vec<(char, char)> },
    Rule(String),
    Seq(Vec<Expr>),
    Alt(Vec<Expr>),
    Repeat(Box<Expr>, u32, Option<u32>),
}

#[derive(Debug)]
pub struct Grammar {
    pub names: Vec<String>,
    rules: HashMap<String, Expr>,
}

pub fn compile(schema: Value, options: GrammarOptions) -> String {
    let schema = JsonSchema::from_value(schema).expect("schema deserializes");
    grammar_for_schema(&schema, &options).expect("schema compiles")
}

pub fn flat() -> GrammarOptions {
    GrammarOptions { allow_new_lines: false, trailing_new_lines: 0, ..GrammarOptions::default() }
}

impl Grammar {
    pub fn parse(text: &str) -> Self {
        let mut names = Vec::new();
        let mut rules = HashMap::new();
        for line in text.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (name, body) = line.split_once(" ::= ").unwrap_or_else(|| panic!("not a rule: {line}"));
            let mut parser = Parser { chars: body.chars().collect(), pos: 0 };
            let expr = parser.alternation();
            parser.skip_ws();
            assert_eq!(parser.pos, parser.chars.len(), "trailing input in rule: {line}");
            assert!(rules.insert(name.to_string(), expr).is_none(), "duplicate rule {name}");
            names.push(name.to_string());
        }
        for expr in rules.values() {
            check_refs(expr, &rules);
        }
        Self { names, rules }
    }

    pub fn accepts(&self, text: &str) -> bool {
        let mut matcher = Matcher { grammar: self, input: text.chars().collect(), memo: HashMap::new() };
        let root = self.rules.get("root").expect("grammar has a root rule");
        matcher.ends(root, 0).contains(&matcher.input.len())
    }
}

fn check_refs(expr: &Expr, rules: &HashMap<String, Expr>) {
    match expr {
        Expr::Rule(name) => assert!(rules.contains_key(name), "undefined rule {name}"),
        Expr::Seq(items) | Expr::Alt(items) => items.iter().for_each(|e| check_refs(e, rules)),
        Expr::Repeat(inner, _, _) => check_refs(inner, rules),
        Expr::Literal(_) | Expr::Class { .. } => {}
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> char {
        let c = self.chars[self.pos];
        self.pos += 1;
        c
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn alternation(&mut self) -> Expr {
        let mut alternatives = vec![self.sequence()];
        loop {
            self.skip_ws();
            if !self.eat('|') {
                break;
            }
            alternatives.push(self.sequence());
        }
        if alternatives.len() == 1 { alternatives.remove(0) } else { Expr::Alt(alternatives) }
    }

    fn sequence(&mut self) -> Expr {
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None | Some('|') | Some(')') => break,
                Some(_) => {
                    let atom = self.atom();
                    items.push(self.postfix(atom));
                }
            }
        }
        Expr::Seq(items)
    }

    fn atom(&mut self) -> Expr {
        match self.bump() {
            '"' => {
                let mut text = Vec::new();
                loop {
                    match self.bump() {
                        '"' => break,
                        '\\' => text.push(self.escape()),
                        c => text.push(c),
                    }
                }
                Expr::Literal(text)
            }
            '[' => {
                let negated = self.eat('^');
                let mut ranges = Vec::new();
                loop {
                    let c = self.bump();
                    if c == ']' {
                        break;
                    }
                    let lo = if c == '\\' { self.escape() } else { c };
                    let is_range = self.peek() == Some('-') && self.chars.get(self.pos + 1) != Some(&']');
                    if is_range {
                        self.pos += 1;
                        let c = self.bump();
                        let hi = if c == '\\' { self.escape() } else { c };
                        ranges.push((lo, hi));
                    } else {
                        ranges.push((lo, lo));
                    }
                }
                Expr::Class { negated, ranges }
            }
            '(' => {
                let inner = self.alternation();
                self.skip_ws();
                assert!(self.eat(')'), "unclosed group");
                inner
            }
            c if c.is_ascii_alphanumeric() => {
                let mut name = String::from(c);
                while let Some(c) = self.peek().filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_') {
                    name.push(c);
                    self.pos += 1;
                }
                Expr::Rule(name)
            }
            c => panic!("unexpected {c:?} at {}", self.pos),
        }
    }

    fn escape(&mut self) -> char {
        match self.bump() {
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            'x' => self.hex(2),
            'u' => self.hex(4),
            other => other,
        }
    }

    fn hex(&mut self, digits: usize) -> char {
        let text: String = (0..digits).map(|_| self.bump()).collect();
        char::from_u32(u32::from_str_radix(&text, 16).expect("hex escape")).expect("valid char")
    }

    fn number(&mut self) -> u32 {
        let mut n = 0;
        while let Some(d) = self.peek().and_then(|c| c.to_digit(10)) {
            n = n * 10 + d;
            self.pos += 1;
        }
        n
    }

    fn postfix(&mut self, atom: Expr) -> Expr {
        let mut expr = atom;
        loop {
            let (min, max) = match self.peek() {
                Some('?') => (0, Some(1)),
                Some('*') => (0, None),
                Some('+') => (1, None),
                Some('{') => {
                    self.pos += 1;
                    let min = self.number();
                    let max = if self.eat(',') {
                        if self.peek() == Some('}') { None } else { Some(self.number()) }
                    } else {
                        Some(min)
                    };
                    assert_eq!(self.peek(), Some('}'), "bad repetition");
                    (min, max)
                }
                _ => return expr,
            };
            self.pos += 1;
            expr = Expr::Repeat(Box::new(expr), min, max);
        }
    }
}

struct Matcher<'g> {
    grammar: &'g Grammar,
    input: Vec<char>,
    memo: HashMap<(&'g str, usize), BTreeSet<usize>>,
}

impl<'g> Matcher<'g> {
    /// Every position where a match of `expr` starting at `pos` can end.
    fn ends(&mut self, expr: &'g Expr, pos: usize) -> BTreeSet<usize> {
        let mut out = BTreeSet::new();
        match expr {
            Expr::Literal(text) => {
                if self.input[pos..].starts_with(text) {
                    out.insert(pos + text.len());
                }
            }
            Expr::Class { negated, ranges } => {
                if let Some(&c) = self.input.get(pos) {
                    let hit = ranges.iter().any(|(lo, hi)| *lo <= c && c <= *hi);
                    if hit != *negated {
                        out.insert(pos + 1);
                    }
                }
            }
            Expr::Rule(name) => {
                let key = (name.as_str(), pos);
                if let Some(known) = self.memo.get(&key) {
                    return known.clone();
                }
                self.memo.insert(key, BTreeSet::new());
                let grammar = self.grammar;
                let rule = &grammar.rules[name];
                out = self.ends(rule, pos);
                self.memo.insert(key, out.clone());
            }
            Expr::Seq(items) => {
                out.insert(pos);
                for item in items {
                    let mut next = BTreeSet::new();
                    for p in out {
                        next.extend(self.ends(item, p));
                    }
                    out = next;
                    if out.is_empty() {
                        break;
                    }
                }
            }
            Expr::Alt(alternatives) => {
                for alternative in alternatives {
                    out.extend(self.ends(alternative, pos));
                }
            }
            Expr::Repeat(inner, min, max) => {
                let mut frontier = BTreeSet::from([pos]);
                let mut seen = BTreeSet::new();
                if *min == 0 {
                    out.insert(pos);
                }
                let mut count = 0;
                while !frontier.is_empty() && max.is_none_or(|m| count < m) {
                    count += 1;
                    let mut next = BTreeSet::new();
                    for p in &frontier {
                        next.extend(self.ends(inner, *p));
                    }
                    if count >= *min {
                        out.extend(next.iter().copied());
                        if max.is_none() {
                            next.retain(|p| seen.insert(*p));
                        }
                    }
                    frontier = next;
                }
            }
        }
        out
    }
}

//! A canned executable schema for driving the pipeline in tests and demos.
//!
//! Carries its own minimal query parser, standing in for the real
//! parser/validator behind the [`ExecutableSchema`] boundary. The schema:
//!
//! ```text
//! type Query        { name: String!  echo(value: String): String
//!                     find(id: Int!): User!  error: String  panics: String }
//! type Mutation     { name: String!  upload(file: Upload!): File!
//!                     uploads(files: [Upload!]!): [File!]! }
//! type Subscription { ticks(limit: Int): Int! }
//! ```

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use oxgql_core::{
    Argument, Document, ErrorList, ExecutableSchema, Executor, Field, FieldContext, GqlError,
    Operation, OperationKind, TypeRef, VariableDefinition,
};
use serde_json::{json, Value};
use std::sync::Arc;

/// A fresh executor over the canned schema.
pub fn executor() -> Executor {
    Executor::new(schema())
}

pub fn schema() -> Arc<dyn ExecutableSchema> {
    Arc::new(TestSchema)
}

pub struct TestSchema;

const QUERY_FIELDS: &[&str] = &["name", "echo", "find", "error", "panics", "__schema", "__type"];
const MUTATION_FIELDS: &[&str] = &["name", "upload", "uploads"];
const SUBSCRIPTION_FIELDS: &[&str] = &["ticks"];

#[async_trait]
impl ExecutableSchema for TestSchema {
    fn parse(&self, query: &str) -> Result<Arc<Document>, ErrorList> {
        parse(query).map(Arc::new).map_err(|err| vec![err])
    }

    fn validate(&self, doc: &Document) -> Result<(), ErrorList> {
        let mut errors = Vec::new();
        for op in &doc.operations {
            let known: &[&str] = match op.kind {
                OperationKind::Query => QUERY_FIELDS,
                OperationKind::Mutation => MUTATION_FIELDS,
                OperationKind::Subscription => SUBSCRIPTION_FIELDS,
            };
            for field in &op.selection_set {
                if !known.contains(&field.name.as_str()) {
                    errors.push(GqlError::validation(format!(
                        "field {} is not defined on {}",
                        field.name,
                        op.kind.root_type()
                    )));
                }
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn field_type(&self, parent_type: &str, field: &str) -> String {
        let ty = match (parent_type, field) {
            ("Query", "name") | ("Mutation", "name") => "String!",
            ("Query", "echo") | ("Query", "error") => "String",
            ("Query", "find") => "User!",
            ("User", "id") => "Int!",
            ("User", "name") => "String!",
            ("Mutation", "upload") => "File!",
            ("Mutation", "uploads") => "[File!]!",
            ("File", "filename") | ("File", "content") => "String!",
            ("File", "size") => "Int!",
            ("Subscription", "ticks") => "Int!",
            _ => "",
        };
        ty.to_string()
    }

    async fn resolve(&self, ctx: FieldContext) -> Result<Value, GqlError> {
        match (ctx.parent_type.as_str(), ctx.field.name.as_str()) {
            ("Query", "name") | ("Mutation", "name") => Ok(json!("test")),
            ("Query", "echo") => Ok(ctx.argument("value").cloned().unwrap_or(Value::Null)),
            ("Query", "find") => {
                let id = ctx.argument("id").and_then(Value::as_i64).unwrap_or(0);
                Ok(json!({"id": id, "name": format!("user {id}")}))
            }
            ("Query", "error") => Err(GqlError::execution("resolver error")),
            ("Query", "panics") => panic!("test panic"),
            ("Query", "__schema") => Ok(json!({"queryType": {"name": "Query"}})),
            ("Mutation", "upload") => {
                let file = ctx
                    .upload("file")
                    .ok_or_else(|| GqlError::execution("file argument is not an upload"))?;
                file_value(file)
            }
            ("Mutation", "uploads") => {
                let Some(Value::Array(markers)) = ctx.argument("files") else {
                    return Err(GqlError::execution("files argument is not a list"));
                };
                let mut out = Vec::with_capacity(markers.len());
                for marker in markers {
                    let file = ctx
                        .op
                        .raw
                        .upload_for(marker)
                        .ok_or_else(|| GqlError::execution("files entry is not an upload"))?;
                    out.push(file_value(file)?);
                }
                Ok(Value::Array(out))
            }
            // child fields read straight off the parent object
            _ => Ok(ctx.parent.get(&ctx.field.name).cloned().unwrap_or(Value::Null)),
        }
    }

    async fn subscribe(&self, ctx: FieldContext) -> Result<BoxStream<'static, Value>, GqlError> {
        match ctx.field.name.as_str() {
            "ticks" => {
                let limit = ctx.argument("limit").and_then(Value::as_u64).unwrap_or(3);
                Ok(futures::stream::iter((1..=limit).map(|n| json!(n))).boxed())
            }
            other => Err(GqlError::validation(format!(
                "field {other} is not defined on Subscription"
            ))),
        }
    }
}

fn file_value(file: &oxgql_core::Upload) -> Result<Value, GqlError> {
    let bytes = file
        .bytes()
        .map_err(|err| GqlError::execution(format!("failed to read upload: {err}")))?;
    Ok(json!({
        "filename": file.filename,
        "size": file.size,
        "content": String::from_utf8_lossy(&bytes),
    }))
}

// --- minimal query-language parser ---

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Name(String),
    Int(i64),
    Float(f64),
    Str(String),
    Punct(char),
}

fn lex(src: &str) -> Result<Vec<Token>, GqlError> {
    let mut tokens = Vec::new();
    let mut chars = src.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() || c == ',' => {
                chars.next();
            }
            '#' => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '{' | '}' | '(' | ')' | ':' | '$' | '=' | '!' | '[' | ']' => {
                tokens.push(Token::Punct(c));
                chars.next();
            }
            '"' => {
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => {
                            if let Some(esc) = chars.next() {
                                s.push(esc);
                            }
                        }
                        Some(ch) => s.push(ch),
                        None => return Err(GqlError::parse("unterminated string")),
                    }
                }
                tokens.push(Token::Str(s));
            }
            c if c.is_ascii_digit() || c == '-' => {
                let mut num = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' || c == '-' {
                        num.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if num.contains('.') {
                    match num.parse() {
                        Ok(f) => tokens.push(Token::Float(f)),
                        Err(_) => return Err(GqlError::parse(format!("invalid number {num}"))),
                    }
                } else {
                    match num.parse() {
                        Ok(i) => tokens.push(Token::Int(i)),
                        Err(_) => return Err(GqlError::parse(format!("invalid number {num}"))),
                    }
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        name.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Name(name));
            }
            other => {
                return Err(GqlError::parse(format!("unexpected character {other:?}")));
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

/// Parses a query document, covering the subset the canned schema needs:
/// operation headers with variable definitions and defaults, nested
/// selection sets, aliases, and literal or variable arguments.
pub fn parse(src: &str) -> Result<Document, GqlError> {
    let mut parser = Parser {
        tokens: lex(src)?,
        pos: 0,
    };
    let mut operations = Vec::new();
    while parser.peek().is_some() {
        operations.push(parser.operation()?);
    }
    if operations.is_empty() {
        return Err(GqlError::parse("document contains no definitions"));
    }
    Ok(Document { operations })
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn is_punct(&self, c: char) -> bool {
        matches!(self.peek(), Some(Token::Punct(p)) if *p == c)
    }

    fn expect_punct(&mut self, c: char) -> Result<(), GqlError> {
        match self.advance() {
            Some(Token::Punct(p)) if p == c => Ok(()),
            other => Err(GqlError::parse(format!("expected {c:?}, found {other:?}"))),
        }
    }

    fn name(&mut self) -> Result<String, GqlError> {
        match self.advance() {
            Some(Token::Name(name)) => Ok(name),
            other => Err(GqlError::parse(format!("expected a name, found {other:?}"))),
        }
    }

    fn operation(&mut self) -> Result<Operation, GqlError> {
        match self.peek() {
            Some(Token::Punct('{')) => Ok(Operation {
                kind: OperationKind::Query,
                name: None,
                variable_definitions: Vec::new(),
                selection_set: self.selection_set()?,
            }),
            Some(Token::Name(word)) => {
                let kind = match word.as_str() {
                    "query" => OperationKind::Query,
                    "mutation" => OperationKind::Mutation,
                    "subscription" => OperationKind::Subscription,
                    other => {
                        return Err(GqlError::parse(format!("unexpected token {other:?}")));
                    }
                };
                self.advance();
                let name = match self.peek() {
                    Some(Token::Name(_)) => Some(self.name()?),
                    _ => None,
                };
                let variable_definitions = if self.is_punct('(') {
                    self.variable_definitions()?
                } else {
                    Vec::new()
                };
                Ok(Operation {
                    kind,
                    name,
                    variable_definitions,
                    selection_set: self.selection_set()?,
                })
            }
            other => Err(GqlError::parse(format!("unexpected token {other:?}"))),
        }
    }

    fn variable_definitions(&mut self) -> Result<Vec<VariableDefinition>, GqlError> {
        self.expect_punct('(')?;
        let mut defs = Vec::new();
        while !self.is_punct(')') {
            self.expect_punct('$')?;
            let name = self.name()?;
            self.expect_punct(':')?;
            let ty = self.type_ref()?;
            let default = if self.is_punct('=') {
                self.advance();
                Some(self.literal()?)
            } else {
                None
            };
            defs.push(VariableDefinition { name, ty, default });
        }
        self.expect_punct(')')?;
        Ok(defs)
    }

    fn type_ref(&mut self) -> Result<TypeRef, GqlError> {
        let base = if self.is_punct('[') {
            self.advance();
            let inner = self.type_ref()?;
            self.expect_punct(']')?;
            TypeRef::List(Box::new(inner))
        } else {
            TypeRef::Named(self.name()?)
        };
        if self.is_punct('!') {
            self.advance();
            Ok(TypeRef::NonNull(Box::new(base)))
        } else {
            Ok(base)
        }
    }

    fn selection_set(&mut self) -> Result<Vec<Field>, GqlError> {
        self.expect_punct('{')?;
        let mut fields = Vec::new();
        while !self.is_punct('}') {
            fields.push(self.field()?);
        }
        self.expect_punct('}')?;
        if fields.is_empty() {
            return Err(GqlError::parse("selection set must not be empty"));
        }
        Ok(fields)
    }

    fn field(&mut self) -> Result<Field, GqlError> {
        let first = self.name()?;
        let (alias, name) = if self.is_punct(':') {
            self.advance();
            (Some(first), self.name()?)
        } else {
            (None, first)
        };
        let arguments = if self.is_punct('(') {
            self.arguments()?
        } else {
            Vec::new()
        };
        let selection_set = if self.is_punct('{') {
            self.selection_set()?
        } else {
            Vec::new()
        };
        Ok(Field {
            alias,
            name,
            arguments,
            selection_set,
        })
    }

    fn arguments(&mut self) -> Result<Vec<(String, Argument)>, GqlError> {
        self.expect_punct('(')?;
        let mut args = Vec::new();
        while !self.is_punct(')') {
            let name = self.name()?;
            self.expect_punct(':')?;
            args.push((name, self.argument_value()?));
        }
        self.expect_punct(')')?;
        Ok(args)
    }

    fn argument_value(&mut self) -> Result<Argument, GqlError> {
        if self.is_punct('$') {
            self.advance();
            return Ok(Argument::Variable(self.name()?));
        }
        Ok(Argument::Literal(self.literal()?))
    }

    fn literal(&mut self) -> Result<Value, GqlError> {
        match self.advance() {
            Some(Token::Int(i)) => Ok(json!(i)),
            Some(Token::Float(f)) => Ok(json!(f)),
            Some(Token::Str(s)) => Ok(json!(s)),
            Some(Token::Name(word)) => match word.as_str() {
                "true" => Ok(json!(true)),
                "false" => Ok(json!(false)),
                "null" => Ok(Value::Null),
                enum_value => Ok(json!(enum_value)),
            },
            Some(Token::Punct('[')) => {
                let mut items = Vec::new();
                while !self.is_punct(']') {
                    items.push(self.literal()?);
                }
                self.expect_punct(']')?;
                Ok(Value::Array(items))
            }
            other => Err(GqlError::parse(format!("expected a value, found {other:?}"))),
        }
    }
}

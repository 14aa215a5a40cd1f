//! Schema compilation.
//!
//! A [`CompilationSession`] owns the generation handle and the custom rule registry of one
//! compilation. The schema driver walks a schema object, hands each keyword occurrence to
//! the dispatcher in [`keyword`], and recurses into subschemas through [`subschema`].

pub mod data;
pub(crate) mod errors;
pub mod keyword;
pub mod registry;
pub mod subschema;

use crate::codegen::{
    CodeGen, ErrorTemplate, Expr, Name, Op, Procedure, TopSchemaRef,
    names::{DATA, ERRORS, PARENT_DATA, PARENT_DATA_PROPERTY},
};
use crate::error::CompileError;
use crate::options::Options;
use crate::validator::Validator;
use registry::CustomRules;
use serde_json::Value;

/// Keys that annotate a schema and are never compiled.
const ANNOTATIONS: [&str; 4] = ["$async", "$schema", "$id", "$comment"];

/// State of one schema compilation.
pub struct CompilationSession<'h> {
    host: &'h Validator,
    pub(crate) code: CodeGen,
    pub(crate) rules: CustomRules,
    is_async: bool,
}

impl<'h> CompilationSession<'h> {
    pub(crate) fn new(host: &'h Validator, is_async: bool) -> Self {
        Self {
            host,
            code: CodeGen::new(),
            rules: CustomRules::new(),
            is_async,
        }
    }

    pub fn host(&self) -> &'h Validator {
        self.host
    }

    pub fn options(&self) -> &'h Options {
        self.host.options()
    }

    pub fn code(&mut self) -> &mut CodeGen {
        &mut self.code
    }

    pub fn rules(&self) -> &CustomRules {
        &self.rules
    }

    /// Whether the procedure being compiled may await external rules.
    pub fn is_async(&self) -> bool {
        self.is_async
    }

    pub(crate) fn finish(self) -> (Procedure, CustomRules) {
        (self.code.finish(), self.rules)
    }
}

/// The position of the schema being compiled, in the schema and in the data.
#[derive(Debug, Clone)]
pub struct SchemaCxt<'s> {
    pub schema: &'s Value,
    pub top_schema_ref: TopSchemaRef,
    /// JSON pointer of `schema` inside the top schema.
    pub schema_path: String,
    /// Schema path reported in error records.
    pub err_schema_path: String,
    pub data: Name,
    pub parent_data: Name,
    pub parent_data_property: Expr,
    pub data_level: usize,
    /// Data binding of every level, the root first.
    pub data_names: Vec<Name>,
    /// Property name or index that led to every level.
    pub data_path_arr: Vec<Expr>,
    pub composite_rule: bool,
}

impl<'s> SchemaCxt<'s> {
    pub fn root(schema: &'s Value) -> Self {
        Self {
            schema,
            top_schema_ref: TopSchemaRef::Root,
            schema_path: String::new(),
            err_schema_path: "#".to_string(),
            data: DATA,
            parent_data: PARENT_DATA,
            parent_data_property: Expr::var(&PARENT_DATA_PROPERTY),
            data_level: 0,
            data_names: vec![DATA],
            data_path_arr: vec![Expr::Undefined],
            composite_rule: false,
        }
    }
}

/// Compiles a whole schema into a procedure and the registry its rules live in.
pub(crate) fn compile_schema(
    host: &Validator,
    schema: &Value,
) -> Result<(Procedure, CustomRules, bool), CompileError> {
    let is_async = schema
        .get("$async")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let mut session = CompilationSession::new(host, is_async);
    schema_code(&mut session, &SchemaCxt::root(schema))?;
    let (procedure, rules) = session.finish();
    Ok((procedure, rules, is_async))
}

/// Emits the checks of every keyword of the schema at `it`.
pub(crate) fn schema_code(
    session: &mut CompilationSession<'_>,
    it: &SchemaCxt<'_>,
) -> Result<(), CompileError> {
    let map = match it.schema {
        Value::Bool(true) => return Ok(()),
        Value::Bool(false) => {
            false_schema_error(session, it);
            return Ok(());
        }
        Value::Object(map) => map,
        _ => {
            return Err(CompileError::InvalidSchema(format!(
                "schema at {} must be an object or boolean",
                it.err_schema_path
            )));
        }
    };

    let host = session.host();
    let options = session.options();
    for key in map.keys() {
        if host.get_keyword(key).is_none() && !ANNOTATIONS.contains(&key.as_str()) {
            if options.strict {
                return Err(CompileError::UnknownKeyword(key.into()));
            }
            tracing::warn!(keyword = %key, path = %it.err_schema_path, "unknown keyword ignored");
        }
    }

    let errs_count = (!options.all_errors && !map.is_empty())
        .then(|| session.code.declare_const("_errs", Expr::var(&ERRORS)));

    let mut present = host
        .keywords()
        .filter(|(name, _)| map.contains_key(*name))
        .peekable();
    while let Some((name, def)) = present.next() {
        if def.data_type.is_empty() {
            keyword::keyword_code(session, it, name, def, None)?;
        } else {
            let rule_type = (def.data_type.len() == 1).then(|| def.data_type[0]);
            session
                .code
                .if_(Expr::var(&it.data).deref().has_type(def.data_type.clone()));
            keyword::keyword_code(session, it, name, def, rule_type)?;
            session.code.end_if();
        }

        // Later keywords only run while nothing has failed yet.
        if let Some(errs_count) = &errs_count
            && present.peek().is_some()
        {
            session
                .code
                .if_(Expr::var(&ERRORS).equals(Expr::var(errs_count)));
        }
    }

    Ok(())
}

fn false_schema_error(session: &mut CompilationSession<'_>, it: &SchemaCxt<'_>) {
    let options = session.options();
    session.code.emit(Op::PushError(ErrorTemplate {
        keyword: "false schema".into(),
        schema_path: it.err_schema_path.clone(),
        data: it.data.clone(),
        params: Vec::new(),
        message: options.messages.then(|| "boolean schema is false".to_string()),
        verbose: None,
    }));
    if !(options.all_errors || it.composite_rule) {
        session.code.return_(false);
    }
}

use super::schema_check::validate_keyword_schema;
use crate::codegen::{CodeGen, Expr, Name};
use crate::compile::data::{get_data, schema_ref_or_val};
use crate::compile::errors::report_error;
use crate::compile::subschema::{Subschema, apply_subschema};
use crate::compile::{CompilationSession, SchemaCxt};
use crate::definition::{ErrorDescriptor, ErrorParams, JsonType, KeywordDefinition};
use crate::error::CompileError;
use crate::options::Options;
use crate::validator::Validator;
use serde_json::Value;

static UNDEFINED_SCHEMA: Value = Value::Null;

/// What the remainder of the current block does after a control-flow primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Nothing emitted until the enclosing block closes will run.
    Unreachable,
}

/// The state of one keyword occurrence while it compiles.
pub struct KeywordCxt<'a, 'h> {
    pub(crate) session: &'a mut CompilationSession<'h>,
    pub(crate) it: &'a SchemaCxt<'a>,
    pub(crate) def: Option<&'a KeywordDefinition>,
    pub(crate) keyword: &'a str,
    /// The literal keyword value.
    pub(crate) schema: &'a Value,
    /// The resolved keyword value, a binding when computed from data.
    pub(crate) schema_code: Expr,
    /// A reference to the literal value, or the value itself for primitives.
    pub(crate) schema_value: Expr,
    pub(crate) data_pointer: Option<&'a str>,
    pub(crate) params: ErrorParams,
    in_keyword: bool,
}

/// Returns the `$data` pointer of the keyword if its value is computed from data.
pub(crate) fn data_pointer<'a>(
    options: &Options,
    it: &SchemaCxt<'a>,
    keyword: &str,
    def: &KeywordDefinition,
) -> Option<&'a str> {
    if !(def.data_dependent && options.data) {
        return None;
    }
    it.schema.get(keyword)?.get("$data")?.as_str()
}

impl<'a, 'h> KeywordCxt<'a, 'h> {
    /// Builds the context of `keyword` and emits the binding of a computed keyword value.
    ///
    /// Fails when the keyword schema violates the definition's constraints.
    pub(crate) fn new(
        session: &'a mut CompilationSession<'h>,
        it: &'a SchemaCxt<'a>,
        keyword: &'a str,
        def: &'a KeywordDefinition,
        data_pointer: Option<&'a str>,
    ) -> Result<Self, CompileError> {
        let schema = it.schema.get(keyword).unwrap_or(&UNDEFINED_SCHEMA);
        validate_keyword_schema(session.options(), it, keyword, def, data_pointer.is_some())?;

        let schema_value = schema_ref_or_val(it, keyword, data_pointer.is_some());
        let schema_code = match data_pointer {
            Some(pointer) => {
                let data = get_data(pointer, it)?;
                Expr::var(&session.code.declare_const("schema", data.deref()))
            }
            None => {
                if !def.schema_type.is_empty() && !JsonType::any_matches(&def.schema_type, schema) {
                    return Err(CompileError::SchemaTypeMismatch {
                        keyword: keyword.into(),
                        expected: expected_types(&def.schema_type),
                    });
                }
                schema_value.clone()
            }
        };

        Ok(Self {
            session,
            it,
            def: Some(def),
            keyword,
            schema,
            schema_code,
            schema_value,
            data_pointer,
            params: ErrorParams::new(),
            in_keyword: true,
        })
    }

    /// Builds a context for inspecting a keyword without compiling its rule.
    ///
    /// Its control-flow primitives fail with [`CompileError::OutsideKeyword`].
    pub fn inspect(
        session: &'a mut CompilationSession<'h>,
        it: &'a SchemaCxt<'a>,
        keyword: &'a str,
    ) -> Self {
        let schema_code = schema_ref_or_val(it, keyword, false);
        Self {
            session,
            it,
            def: None,
            keyword,
            schema: it.schema.get(keyword).unwrap_or(&UNDEFINED_SCHEMA),
            schema_value: schema_code.clone(),
            schema_code,
            data_pointer: None,
            params: ErrorParams::new(),
            in_keyword: false,
        }
    }

    pub fn code(&mut self) -> &mut CodeGen {
        &mut self.session.code
    }

    pub fn session(&mut self) -> &mut CompilationSession<'h> {
        self.session
    }

    pub fn host(&self) -> &'h Validator {
        self.session.host()
    }

    pub fn it(&self) -> &'a SchemaCxt<'a> {
        self.it
    }

    pub fn keyword(&self) -> &'a str {
        self.keyword
    }

    pub fn schema(&self) -> &'a Value {
        self.schema
    }

    pub fn schema_code(&self) -> &Expr {
        &self.schema_code
    }

    pub fn schema_value(&self) -> &Expr {
        &self.schema_value
    }

    pub fn parent_schema(&self) -> &'a Value {
        self.it.schema
    }

    pub fn data(&self) -> &Name {
        &self.it.data
    }

    /// Whether the keyword value is computed from data.
    pub fn is_data(&self) -> bool {
        self.data_pointer.is_some()
    }

    pub fn all_errors(&self) -> bool {
        self.session.options().all_errors
    }

    pub fn params(&self) -> &ErrorParams {
        &self.params
    }

    /// Fails when `cond` holds, reporting the keyword's error.
    pub fn fail(&mut self, cond: Expr) -> Result<Flow, CompileError> {
        self.fail_with(Some(cond), Self::report_keyword_error)
    }

    /// Reports the keyword's error unconditionally.
    pub fn fail_always(&mut self) -> Result<Flow, CompileError> {
        self.fail_with(None, Self::report_keyword_error)
    }

    /// Runs `action` when `cond` holds, or unconditionally without a condition.
    ///
    /// When collecting every error the conditional closes right away. Otherwise the rest of
    /// the enclosing block only runs when `cond` did not hold.
    pub fn fail_with<F>(&mut self, cond: Option<Expr>, action: F) -> Result<Flow, CompileError>
    where
        F: FnOnce(&mut Self) -> Result<(), CompileError>,
    {
        self.ensure_keyword()?;
        let all_errors = self.all_errors();

        match cond {
            Some(cond) => {
                self.code().if_(cond);
                action(self)?;
                if all_errors {
                    self.code().end_if();
                } else {
                    self.code().else_();
                }
                Ok(Flow::Continue)
            }
            None => {
                action(self)?;
                if all_errors {
                    Ok(Flow::Continue)
                } else {
                    self.code().mark_unreachable();
                    Ok(Flow::Unreachable)
                }
            }
        }
    }

    /// Fails unless `cond` holds.
    pub fn pass(&mut self, cond: Expr) -> Result<Flow, CompileError> {
        self.fail(cond.not())
    }

    pub fn pass_with<F>(&mut self, cond: Expr, action: F) -> Result<Flow, CompileError>
    where
        F: FnOnce(&mut Self) -> Result<(), CompileError>,
    {
        self.fail_with(Some(cond.not()), action)
    }

    /// Continues the enclosing block only while `cond` holds, when stopping at the first
    /// failure. The conditional is closed together with the block.
    pub fn ok(&mut self, cond: Expr) -> Result<Flow, CompileError> {
        self.ensure_keyword()?;
        if self.all_errors() {
            return Ok(Flow::Continue);
        }

        if cond.is_false() {
            self.code().mark_unreachable();
            Ok(Flow::Unreachable)
        } else {
            self.code().if_(cond);
            Ok(Flow::Continue)
        }
    }

    /// Replaces the error parameters, or merges into them when `assign` is set.
    pub fn error_params(&mut self, params: ErrorParams, assign: bool) -> Result<(), CompileError> {
        self.ensure_keyword()?;
        if assign {
            self.params.extend(params);
        } else {
            self.params = params;
        }
        Ok(())
    }

    /// Fails when `cond` holds, unless the computed keyword value is absent.
    ///
    /// A computed value of the wrong type also fails. Literal keyword values behave as
    /// [`KeywordCxt::fail`].
    pub fn fail_data(&mut self, cond: Expr) -> Result<Flow, CompileError> {
        if !self.is_data() {
            return self.fail(cond);
        }

        let schema_type = self.def.map(|def| def.schema_type.clone()).unwrap_or_default();
        let invalid = if schema_type.is_empty() {
            cond
        } else {
            Expr::Or(vec![self.schema_code.clone().has_type(schema_type).not(), cond])
        };
        let present = self.schema_code.clone().is_undefined().not();
        self.fail(Expr::And(vec![present, invalid]))
    }

    /// Applies a nested schema and binds whether it passed to `valid`.
    pub fn subschema(&mut self, sub: Subschema<'_>, valid: &Name) -> Result<(), CompileError> {
        apply_subschema(self.session, self.it, sub, valid)
    }

    fn report_keyword_error(&mut self) -> Result<(), CompileError> {
        let error = self
            .def
            .and_then(|def| def.error.clone())
            .unwrap_or_else(ErrorDescriptor::keyword_error);
        report_error(self, &error);
        Ok(())
    }

    fn ensure_keyword(&self) -> Result<(), CompileError> {
        if self.in_keyword {
            Ok(())
        } else {
            Err(CompileError::OutsideKeyword)
        }
    }
}

fn expected_types(types: &[JsonType]) -> String {
    let types = match types {
        [single] => serde_json::to_string(single),
        many => serde_json::to_string(many),
    };
    types.unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::dump_procedure;
    use crate::options::Options;
    use serde_json::json;

    fn with_cxt<R>(
        options: Options,
        schema: &Value,
        keyword: &str,
        f: impl FnOnce(&mut KeywordCxt<'_, '_>) -> R,
    ) -> (R, String) {
        let host = Validator::new(options);
        let def = KeywordDefinition::validate(|_, _| true.into());
        let mut session = CompilationSession::new(&host, false);
        let it = SchemaCxt::root(schema);
        let result = {
            let mut cxt = KeywordCxt::new(&mut session, &it, keyword, &def, None).unwrap();
            f(&mut cxt)
        };
        let (procedure, _) = session.finish();
        (result, dump_procedure(&procedure))
    }

    #[test]
    fn test_fail_collect_all_closes_conditional() {
        let schema = json!({"isEven": true});
        let (flow, dump) = with_cxt(Options::default().all_errors(true), &schema, "isEven", |cxt| {
            let flow = cxt.fail(Expr::lit(true)).unwrap();
            assert_eq!(cxt.code().depth(), 1);
            flow
        });

        assert_eq!(flow, Flow::Continue);
        assert!(dump.contains("push_error(\"isEven\", \"#/isEven\");"));
        assert!(!dump.contains("return false"));
    }

    #[test]
    fn test_fail_stop_first_leaves_else_open() {
        let schema = json!({"isEven": true});
        let (depth, dump) = with_cxt(Options::default(), &schema, "isEven", |cxt| {
            cxt.fail(Expr::lit(true)).unwrap();
            cxt.code().depth()
        });

        assert_eq!(depth, 2);
        assert!(dump.contains("return false;"));
    }

    #[test]
    fn test_fail_without_condition_marks_unreachable() {
        let schema = json!({"isEven": true});
        let (flow, _) = with_cxt(Options::default(), &schema, "isEven", |cxt| {
            let flow = cxt.fail_always().unwrap();
            assert!(cxt.code().is_unreachable());
            flow
        });
        assert_eq!(flow, Flow::Unreachable);
    }

    #[test]
    fn test_pass_with_runs_action_on_failure_branch() {
        let schema = json!({"isEven": true});
        let (flow, dump) = with_cxt(Options::default(), &schema, "isEven", |cxt| {
            let flow = cxt
                .pass_with(Expr::lit(true), |cxt| cxt.fail_always().map(|_| ()))
                .unwrap();
            assert_eq!(cxt.code().depth(), 2);
            assert!(!cxt.code().is_unreachable());
            flow
        });

        assert_eq!(flow, Flow::Continue);
        assert!(dump.contains("push_error(\"isEven\", \"#/isEven\");"));
    }

    #[test]
    fn test_ok_is_noop_when_collecting_all() {
        let schema = json!({"isEven": true});
        let (depth, dump) = with_cxt(Options::default().all_errors(true), &schema, "isEven", |cxt| {
            cxt.ok(Expr::var(&Name::new("valid0"))).unwrap();
            cxt.code().depth()
        });
        assert_eq!(depth, 1);
        assert!(dump.is_empty());
    }

    #[test]
    fn test_ok_false_is_unreachable() {
        let schema = json!({"isEven": true});
        let (flow, _) = with_cxt(Options::default(), &schema, "isEven", |cxt| {
            cxt.ok(Expr::lit(false)).unwrap()
        });
        assert_eq!(flow, Flow::Unreachable);
    }

    #[test]
    fn test_error_params_assign_merges() {
        let schema = json!({"isEven": true});
        let (params, _) = with_cxt(Options::default(), &schema, "isEven", |cxt| {
            cxt.error_params(ErrorParams::new().with("a", Expr::lit(1)), false)
                .unwrap();
            cxt.error_params(ErrorParams::new().with("b", Expr::lit(2)), true)
                .unwrap();
            cxt.params().clone()
        });
        assert_eq!(params.iter().count(), 2);
    }

    #[test]
    fn test_inspect_primitives_fail() {
        let host = Validator::new(Options::default());
        let schema = json!({"isEven": true});
        let mut session = CompilationSession::new(&host, false);
        let it = SchemaCxt::root(&schema);
        let mut cxt = KeywordCxt::inspect(&mut session, &it, "isEven");

        assert_eq!(cxt.schema_code(), &Expr::lit(true));
        assert_eq!(cxt.fail(Expr::lit(true)), Err(CompileError::OutsideKeyword));
        assert_eq!(cxt.pass(Expr::lit(true)), Err(CompileError::OutsideKeyword));
        assert_eq!(cxt.ok(Expr::lit(true)), Err(CompileError::OutsideKeyword));
        assert_eq!(
            cxt.error_params(ErrorParams::new(), false),
            Err(CompileError::OutsideKeyword)
        );
        assert_eq!(cxt.code().depth(), 1);
    }

    #[test]
    fn test_schema_type_mismatch() {
        let host = Validator::new(Options::default());
        let schema = json!({"range": "wide"});
        let def = KeywordDefinition::validate(|_, _| true.into())
            .with_schema_type([JsonType::Array]);
        let mut session = CompilationSession::new(&host, false);
        let it = SchemaCxt::root(&schema);

        let result = KeywordCxt::new(&mut session, &it, "range", &def, None).map(|_| ());
        assert_eq!(
            result,
            Err(CompileError::SchemaTypeMismatch {
                keyword: "range".into(),
                expected: "\"array\"".to_string(),
            })
        );
    }

    #[test]
    fn test_expected_types() {
        assert_eq!(expected_types(&[JsonType::Number]), "\"number\"");
        assert_eq!(
            expected_types(&[JsonType::Number, JsonType::String]),
            "[\"number\",\"string\"]"
        );
    }
}

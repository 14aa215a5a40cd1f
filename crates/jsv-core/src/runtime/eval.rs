use super::value::{InstancePath, PathSegment, Val, json_equal};
use crate::codegen::{
    CmpOp, ErrorExtension, ErrorTemplate, Expr, Name, Op, OpRef, Procedure, RuleCall,
    TopSchemaRef, Verbose,
    names::{DATA, ERRORS, ROOT_DATA, V_ERRORS},
};
use crate::compile::registry::{CustomRule, CustomRules, RuleRef};
use crate::definition::{AsyncOutcome, Caller, DataCxt, JsonType, RuleArgs};
use crate::error::runtime::RuntimeError;
use crate::validation::{ErrorObject, Validation};
use futures::future::BoxFuture;
use rustc_hash::FxHashMap;
use serde_json::{Map, Value};
use std::any::Any;
use std::borrow::Cow;

static NULL: Value = Value::Null;

enum Step {
    Next,
    Return(bool),
}

/// Mutable state of one validation run.
pub(crate) struct Frame<'d> {
    bindings: FxHashMap<Name, Val>,
    errors: Vec<ErrorObject>,
    root: &'d mut Value,
    context: Option<&'d (dyn Any + Send + Sync)>,
}

impl<'d> Frame<'d> {
    pub(crate) fn new(root: &'d mut Value, context: Option<&'d (dyn Any + Send + Sync)>) -> Self {
        let mut bindings = FxHashMap::default();
        bindings.insert(DATA, Val::Data(InstancePath::root()));
        bindings.insert(ROOT_DATA, Val::Data(InstancePath::root()));
        Self {
            bindings,
            errors: Vec::new(),
            root,
            context,
        }
    }

    fn bind(&mut self, name: &Name, value: Val) {
        self.bindings.insert(name.clone(), value);
    }

    fn instance_path(&self, name: &Name) -> String {
        match self.bindings.get(name) {
            Some(Val::Data(path)) => path.to_pointer(),
            _ => String::new(),
        }
    }

    /// Reads the JSON value behind a binding, borrowing from the instance where possible.
    fn read(&self, name: &Name) -> Option<Cow<'_, Value>> {
        match self.bindings.get(name)? {
            Val::Data(path) => path.resolve(&*self.root).map(Cow::Borrowed),
            Val::Json(value) => Some(Cow::Borrowed(value)),
            other => other.materialize(&*self.root).map(Cow::Owned),
        }
    }
}

/// Runs a procedure against the custom rules and schema it was compiled with.
pub(crate) struct Evaluator<'p> {
    procedure: &'p Procedure,
    rules: &'p CustomRules,
    schema: &'p Value,
}

impl<'p> Evaluator<'p> {
    pub(crate) fn new(
        procedure: &'p Procedure,
        rules: &'p CustomRules,
        schema: &'p Value,
    ) -> Self {
        Self {
            procedure,
            rules,
            schema,
        }
    }

    pub(crate) async fn run(&self, mut frame: Frame<'_>) -> Result<Validation, RuntimeError> {
        let step = self.exec(self.procedure.body(), &mut frame).await?;
        let valid = match step {
            Step::Return(valid) => valid,
            Step::Next => frame.errors.is_empty(),
        };
        Ok(Validation {
            valid,
            errors: frame.errors,
        })
    }

    fn exec<'a, 'd: 'a>(
        &'a self,
        body: &'p [OpRef],
        frame: &'a mut Frame<'d>,
    ) -> BoxFuture<'a, Result<Step, RuntimeError>> {
        Box::pin(async move {
            for op_ref in body {
                let op = self.procedure.pool().get(*op_ref);
                if let Step::Return(valid) = self.exec_op(op, frame).await? {
                    return Ok(Step::Return(valid));
                }
            }
            Ok(Step::Next)
        })
    }

    async fn exec_op(&self, op: &'p Op, frame: &mut Frame<'_>) -> Result<Step, RuntimeError> {
        match op {
            Op::Declare { name, init, .. } => {
                let value = self.eval(init, frame);
                frame.bind(name, value);
            }
            Op::Assign { name, value } => {
                let value = self.eval(value, frame);
                frame.bind(name, value);
            }
            Op::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let branch = if self.eval(cond, frame).is_truthy(&*frame.root) {
                    then_branch
                } else {
                    else_branch
                };
                return self.exec(branch, frame).await;
            }
            Op::Block(body) => return self.exec(body, frame).await,
            Op::CallRule(call) => self.call_rule(call, frame).await?,
            Op::CheckSchema {
                keyword,
                rule,
                schema,
                valid,
            } => {
                let CustomRule::SchemaCheck(validator) = self.rule(*rule, "schema check")? else {
                    return Err(mismatch(*rule, "schema check"));
                };
                let passed = match self.eval(schema, frame).materialize(&*frame.root) {
                    None => true,
                    Some(value) => match validator.validate(&value) {
                        Ok(()) => true,
                        Err(errors) => {
                            tracing::debug!(
                                %keyword,
                                errors = errors.len(),
                                "computed keyword value rejected"
                            );
                            false
                        }
                    },
                };
                frame.bind(valid, Val::Json(Value::Bool(passed)));
            }
            Op::PushError(template) => {
                let error = self.error_object(template, frame);
                frame.errors.push(error);
            }
            Op::ConcatErrors(name) => {
                if let Some(Val::Errors(errors)) = frame.bindings.get(name) {
                    let errors = errors.clone();
                    frame.errors.extend(errors);
                }
            }
            Op::ExtendErrors(extension) => self.extend_errors(extension, frame),
            Op::ResetErrors(name) => {
                let count = frame.bindings.get(name).and_then(Val::as_count).unwrap_or(0);
                frame.errors.truncate(count);
            }
            Op::Return(valid) => return Ok(Step::Return(*valid)),
        }
        Ok(Step::Next)
    }

    fn rule(&self, rule: RuleRef, expected: &'static str) -> Result<&'p CustomRule, RuntimeError> {
        self.rules.get(rule).ok_or_else(|| mismatch(rule, expected))
    }

    async fn call_rule(&self, call: &'p RuleCall, frame: &mut Frame<'_>) -> Result<(), RuntimeError> {
        let rule = self.rule(call.rule, "validate")?;
        let (valid, errors, replacement) = {
            let view: &Frame<'_> = frame;
            let data = view.read(&call.data).unwrap_or(Cow::Borrowed(&NULL));
            let parent_data = view.read(&call.parent_data);
            let schema = call.schema.as_ref().and_then(|expr| self.schema_arg(expr, view));
            let parent_schema = self
                .schema_arg(&call.parent_schema, view)
                .unwrap_or(Cow::Borrowed(&NULL));
            let caller = match view.context {
                Some(context) if call.pass_context => Caller::Context(context),
                _ => Caller::Neutral,
            };
            let args = RuleArgs {
                schema: schema.as_deref(),
                parent_schema: &*parent_schema,
                data_cxt: DataCxt {
                    instance_path: view.instance_path(&call.data),
                    parent_data: parent_data.as_deref(),
                    parent_data_property: self
                        .eval(&call.parent_data_property, view)
                        .materialize(&*view.root),
                    root_data: &*view.root,
                },
                caller,
            };

            tracing::trace!(keyword = %call.keyword, rule = %call.rule, path = %args.data_cxt.instance_path, "calling rule");
            match rule {
                CustomRule::Validate(f) => {
                    let outcome = f(&*data, &args);
                    (outcome.valid, outcome.errors, outcome.data)
                }
                CustomRule::AsyncValidate(f) if call.awaited => match f(&*data, args).await {
                    AsyncOutcome::Ok(valid) => (valid, None, None),
                    AsyncOutcome::Modified { valid, data } => (valid, None, Some(data)),
                    AsyncOutcome::ValidationFailed(errors) => (false, Some(errors), None),
                    AsyncOutcome::Fault(source) => {
                        return Err(RuntimeError::RuleFault {
                            keyword: call.keyword.clone(),
                            source,
                        });
                    }
                },
                _ => return Err(mismatch(call.rule, "validate")),
            }
        };

        frame.bind(&call.valid, Val::Json(Value::Bool(valid)));
        if let Some(name) = &call.errors {
            frame.bind(name, errors.map_or(Val::Json(Value::Null), Val::Errors));
        }
        if let Some(data) = replacement {
            self.write_back(call, frame, data);
        }
        Ok(())
    }

    /// Stores the replacement a modifying rule returned in the data's slot of its parent.
    fn write_back(&self, call: &RuleCall, frame: &mut Frame<'_>, data: Value) {
        let slot = match (
            frame.bindings.get(&call.parent_data),
            self.eval(&call.parent_data_property, frame)
                .materialize(&*frame.root),
        ) {
            (Some(Val::Data(parent)), Some(key)) => parent
                .resolve(&*frame.root)
                .and_then(|value| PathSegment::for_key(value, &key))
                .map(|segment| parent.child(segment)),
            _ => None,
        };

        match slot.as_ref().and_then(|path| path.resolve_mut(&mut *frame.root)) {
            Some(target) => *target = data,
            None => tracing::warn!(
                keyword = %call.keyword,
                "modified data has no parent slot, replacement dropped"
            ),
        }
    }

    fn schema_arg<'f>(&self, expr: &Expr, frame: &'f Frame<'_>) -> Option<Cow<'f, Value>>
    where
        'p: 'f,
    {
        match expr {
            Expr::Schema { top, pointer } => self.schema_at(*top, pointer).map(Cow::Borrowed),
            expr => self.eval(expr, frame).materialize(&*frame.root).map(Cow::Owned),
        }
    }

    fn schema_at(&self, top: TopSchemaRef, pointer: &str) -> Option<&'p Value> {
        match top {
            TopSchemaRef::Root => self.schema.pointer(pointer),
            TopSchemaRef::Rule(rule) => match self.rules.get(rule)? {
                CustomRule::Schema(schema) => schema.pointer(pointer),
                _ => None,
            },
        }
    }

    fn error_object(&self, template: &ErrorTemplate, frame: &Frame<'_>) -> ErrorObject {
        let params = template
            .params
            .iter()
            .filter_map(|(key, expr)| {
                let value = self.eval(expr, frame).materialize(&*frame.root)?;
                Some((key.to_string(), value))
            })
            .collect::<Map<_, _>>();
        let message = template
            .message
            .as_deref()
            .map(|message| fill_message(message, &params));

        let mut error = ErrorObject {
            keyword: template.keyword.to_string(),
            instance_path: frame.instance_path(&template.data),
            schema_path: template.schema_path.clone(),
            params,
            message,
            ..Default::default()
        };
        if let Some(verbose) = &template.verbose {
            self.fill_verbose(&mut error, verbose, &template.data, frame);
        }
        error
    }

    fn extend_errors(&self, extension: &ErrorExtension, frame: &mut Frame<'_>) {
        let since = frame
            .bindings
            .get(&extension.since)
            .and_then(Val::as_count)
            .unwrap_or(0);
        let instance_path = frame.instance_path(&extension.data);
        let mut added = frame.errors.split_off(since.min(frame.errors.len()));

        for error in added.iter_mut() {
            error.schema_path = extension.schema_path.clone();
            if error.instance_path.is_empty() {
                error.instance_path = instance_path.clone();
            }
            if error.keyword.is_empty() {
                error.keyword = extension.keyword.to_string();
            }
            if let Some(verbose) = &extension.verbose {
                self.fill_verbose(error, verbose, &extension.data, frame);
            }
        }
        frame.errors.append(&mut added);
    }

    fn fill_verbose(&self, error: &mut ErrorObject, verbose: &Verbose, data: &Name, frame: &Frame<'_>) {
        error.schema = self.schema_arg(&verbose.schema, frame).map(Cow::into_owned);
        error.parent_schema = self
            .schema_arg(&verbose.parent_schema, frame)
            .map(Cow::into_owned);
        error.data = frame.read(data).map(Cow::into_owned);
    }

    fn eval(&self, expr: &Expr, frame: &Frame<'_>) -> Val {
        let root: &Value = &*frame.root;
        match expr {
            Expr::Undefined => Val::Undefined,
            Expr::Lit(value) => Val::Json(value.clone()),
            Expr::Var(name) if *name == ERRORS => Val::Count(frame.errors.len()),
            Expr::Var(name) if *name == V_ERRORS => Val::Errors(frame.errors.clone()),
            Expr::Var(name) => frame.bindings.get(name).cloned().unwrap_or(Val::Undefined),
            Expr::Schema { top, pointer } => self
                .schema_at(*top, pointer)
                .map_or(Val::Undefined, |value| Val::Json(value.clone())),
            Expr::Not(inner) => Val::Json(Value::Bool(!self.eval(inner, frame).is_truthy(root))),
            Expr::And(items) => Val::Json(Value::Bool(
                items.iter().all(|item| self.eval(item, frame).is_truthy(root)),
            )),
            Expr::Or(items) => Val::Json(Value::Bool(
                items.iter().any(|item| self.eval(item, frame).is_truthy(root)),
            )),
            Expr::IsUndefined(inner) => {
                let undefined = match self.eval(inner, frame) {
                    Val::Undefined => true,
                    Val::Data(path) => path.resolve(root).is_none(),
                    _ => false,
                };
                Val::Json(Value::Bool(undefined))
            }
            Expr::Eq(lhs, rhs) => {
                let equal = match (
                    self.eval(lhs, frame).materialize(root),
                    self.eval(rhs, frame).materialize(root),
                ) {
                    (None, None) => true,
                    (Some(lhs), Some(rhs)) => json_equal(&lhs, &rhs),
                    _ => false,
                };
                Val::Json(Value::Bool(equal))
            }
            Expr::Compare(op, lhs, rhs) => {
                let number = |expr: &Expr| {
                    self.eval(expr, frame)
                        .materialize(root)
                        .and_then(|value| value.as_f64())
                };
                let holds = match (number(lhs), number(rhs)) {
                    (Some(lhs), Some(rhs)) => match op {
                        CmpOp::Lt => lhs < rhs,
                        CmpOp::Le => lhs <= rhs,
                        CmpOp::Gt => lhs > rhs,
                        CmpOp::Ge => lhs >= rhs,
                    },
                    _ => false,
                };
                Val::Json(Value::Bool(holds))
            }
            Expr::Member(base, key) => {
                let Some(key) = self.eval(key, frame).materialize(root) else {
                    return Val::Undefined;
                };
                match self.eval(base, frame) {
                    Val::Data(path) => path
                        .resolve(root)
                        .and_then(|parent| PathSegment::for_key(parent, &key))
                        .map(|segment| path.child(segment))
                        .filter(|child| child.resolve(root).is_some())
                        .map_or(Val::Undefined, Val::Data),
                    Val::Json(value) => PathSegment::for_key(&value, &key)
                        .and_then(|segment| InstancePath::root().child(segment).resolve(&value).cloned())
                        .map_or(Val::Undefined, Val::Json),
                    _ => Val::Undefined,
                }
            }
            Expr::Deref(inner) => match self.eval(inner, frame) {
                Val::Data(path) => path
                    .resolve(root)
                    .map_or(Val::Undefined, |value| Val::Json(value.clone())),
                other => other,
            },
            Expr::Length(inner) => match self.eval(inner, frame).materialize(root) {
                Some(Value::String(s)) => Val::Json(Value::from(s.chars().count())),
                _ => Val::Undefined,
            },
            Expr::HasType(inner, types) => {
                let matches = self
                    .eval(inner, frame)
                    .materialize(root)
                    .is_some_and(|value| JsonType::any_matches(types, &value));
                Val::Json(Value::Bool(matches))
            }
            Expr::IsErrorList(inner) => {
                Val::Json(Value::Bool(matches!(self.eval(inner, frame), Val::Errors(_))))
            }
        }
    }
}

fn mismatch(rule: RuleRef, expected: &'static str) -> RuntimeError {
    RuntimeError::RuleKindMismatch {
        rule: rule.to_string(),
        expected,
    }
}

/// Substitutes `{param}` placeholders with the record's parameter values.
fn fill_message(template: &str, params: &Map<String, Value>) -> String {
    params
        .iter()
        .fold(template.to_string(), |message, (key, value)| {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            message.replace(&format!("{{{key}}}"), &text)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::CodeGen;
    use serde_json::json;

    fn run(code: CodeGen, data: &mut Value) -> Validation {
        let procedure = code.finish();
        let rules = CustomRules::new();
        let schema = json!({});
        let evaluator = Evaluator::new(&procedure, &rules, &schema);
        futures::executor::block_on(evaluator.run(Frame::new(data, None))).unwrap()
    }

    fn push_error(keyword: &str, message: &str, params: Vec<(&str, Expr)>) -> Op {
        Op::PushError(ErrorTemplate {
            keyword: keyword.into(),
            schema_path: format!("#/{keyword}"),
            data: DATA,
            params: params
                .into_iter()
                .map(|(key, expr)| (key.into(), expr))
                .collect(),
            message: Some(message.to_string()),
            verbose: None,
        })
    }

    #[test]
    fn test_empty_procedure_is_valid() {
        let validation = run(CodeGen::new(), &mut json!(1));
        assert!(validation.valid);
        assert!(validation.errors.is_empty());
    }

    #[test]
    fn test_return_stops_run() {
        let mut code = CodeGen::new();
        code.emit(push_error("limit", "should NOT be longer than {limit}", vec![("limit", Expr::lit(2))]));
        code.return_(false);

        let validation = run(code, &mut json!("abc"));
        assert!(!validation.valid);
        assert_eq!(validation.errors.len(), 1);
        assert_eq!(
            validation.errors[0].message.as_deref(),
            Some("should NOT be longer than 2")
        );
        assert_eq!(validation.errors[0].params, json!({"limit": 2}).as_object().cloned().unwrap());
    }

    #[test]
    fn test_member_yields_child_location() {
        let mut code = CodeGen::new();
        let name = code.declare_const("data", Expr::var(&DATA).member(Expr::lit("items")).member(Expr::lit("1")));
        code.if_(Expr::var(&name).deref().equals(Expr::lit("b")));
        code.emit(Op::PushError(ErrorTemplate {
            keyword: "const".into(),
            schema_path: "#/const".into(),
            data: name,
            params: Vec::new(),
            message: None,
            verbose: None,
        }));
        code.end_if();

        let validation = run(code, &mut json!({"items": ["a", "b"]}));
        assert!(!validation.valid);
        assert_eq!(validation.errors[0].instance_path, "/items/1");
    }

    #[test]
    fn test_undefined_params_are_skipped() {
        let mut code = CodeGen::new();
        code.emit(push_error(
            "required",
            "should have required property '{missingProperty}'",
            vec![
                ("missingProperty", Expr::lit("id")),
                ("limit", Expr::var(&DATA).member(Expr::lit("missing"))),
            ],
        ));

        let validation = run(code, &mut json!({}));
        let error = &validation.errors[0];
        assert_eq!(error.message.as_deref(), Some("should have required property 'id'"));
        assert!(!error.params.contains_key("limit"));
    }

    #[test]
    fn test_reset_errors_truncates() {
        let mut code = CodeGen::new();
        code.emit(push_error("a", "a", Vec::new()));
        code.emit(push_error("b", "b", Vec::new()));
        let none = code.declare_const("_errs", Expr::lit(0));
        code.emit(Op::ResetErrors(none));
        code.emit(push_error("c", "c", Vec::new()));

        let validation = run(code, &mut json!(null));
        assert_eq!(
            validation.errors.iter().map(|e| e.keyword.as_str()).collect::<Vec<_>>(),
            vec!["c"]
        );
    }

    #[test]
    fn test_fill_message() {
        let params = json!({"limit": 3, "type": "string"});
        assert_eq!(
            fill_message("should be {type} of {limit}", params.as_object().unwrap()),
            "should be string of 3"
        );
    }
}

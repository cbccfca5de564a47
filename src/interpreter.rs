//! Tree-walking evaluator.
//!
//! Execution pipeline:
//! run -> exec_block (top-level statements) -> exec_statement
//! -> eval_expression -> call_method -> exec_block (method body).
//!
//! Statement execution propagates an `ExecResult` so that a `return`
//! anywhere in a body unwinds to the enclosing method call (or to `run`
//! for a top-level return). Program output goes through a `Context` sink
//! passed down the walk; `str(...)` renders without touching the sink.

use std::io::{self, Write};
use std::rc::Rc;

use crate::ast::{
    ArithmeticOp, ComparisonOp, Expression, LogicalOp, Program, Statement, VariablePath,
};
use crate::runtime::{Closure, Instance, RuntimeError, Value};

const INIT_METHOD: &str = "__init__";
const STR_METHOD: &str = "__str__";
const EQ_METHOD: &str = "__eq__";
const LT_METHOD: &str = "__lt__";
const ADD_METHOD: &str = "__add__";
const SELF_NAME: &str = "self";

/// Sink for everything a program prints.
pub trait Context {
    fn write(&mut self, text: &str) -> io::Result<()>;
}

/// Context writing straight through to an underlying stream.
pub struct StreamContext<W: Write> {
    output: W,
}

impl<W: Write> StreamContext<W> {
    pub fn new(output: W) -> Self {
        Self { output }
    }
}

impl<W: Write> Context for StreamContext<W> {
    fn write(&mut self, text: &str) -> io::Result<()> {
        self.output.write_all(text.as_bytes())
    }
}

/// Context capturing output in memory, for tests.
#[derive(Debug, Default)]
pub struct BufferContext {
    output: String,
}

impl BufferContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output(&self) -> &str {
        &self.output
    }
}

impl Context for BufferContext {
    fn write(&mut self, text: &str) -> io::Result<()> {
        self.output.push_str(text);
        Ok(())
    }
}

/// Control-flow marker for statement execution.
enum ExecResult {
    Continue,
    Return(Value),
}

pub struct Interpreter;

impl Interpreter {
    pub fn new() -> Self {
        Self
    }

    /// Runs a whole program against a fresh global scope. A top-level
    /// `return` stops execution and hands its value back; a program that
    /// runs off the end yields `None`.
    pub fn run(
        &self,
        program: &Program,
        context: &mut dyn Context,
    ) -> Result<Value, RuntimeError> {
        let mut globals = Closure::new();
        match self.exec_block(&program.statements, &mut globals, context)? {
            ExecResult::Continue => Ok(Value::None),
            ExecResult::Return(value) => Ok(value),
        }
    }

    /// Renders a value the way `print` would show it.
    pub fn render(
        &self,
        value: &Value,
        context: &mut dyn Context,
    ) -> Result<String, RuntimeError> {
        match value {
            Value::None => Ok("None".to_string()),
            Value::Bool(true) => Ok("True".to_string()),
            Value::Bool(false) => Ok("False".to_string()),
            Value::Number(number) => Ok(number.to_string()),
            Value::Str(text) => Ok(text.to_string()),
            Value::Class(class) => Ok(format!("Class {}", class.name())),
            Value::Instance(instance) => {
                // Resolution is by name alone here; a wrong-arity __str__
                // is an error rather than a fallback to the address form.
                if instance.class().method(STR_METHOD).is_some() {
                    let result = self.call_method(instance, STR_METHOD, Vec::new(), context)?;
                    return match result {
                        Value::Str(text) => Ok(text.to_string()),
                        other => Err(RuntimeError::StrMustReturnString {
                            class: instance.class().name().to_string(),
                            type_name: other.type_name(),
                        }),
                    };
                }
                Ok(format!(
                    "<{} object at {:p}>",
                    instance.class().name(),
                    Rc::as_ptr(instance)
                ))
            }
        }
    }

    fn exec_block(
        &self,
        body: &[Statement],
        closure: &mut Closure,
        context: &mut dyn Context,
    ) -> Result<ExecResult, RuntimeError> {
        // Execute statements in order until one returns, then unwind.
        for statement in body {
            match self.exec_statement(statement, closure, context)? {
                ExecResult::Continue => {}
                ExecResult::Return(value) => return Ok(ExecResult::Return(value)),
            }
        }
        Ok(ExecResult::Continue)
    }

    fn exec_statement(
        &self,
        statement: &Statement,
        closure: &mut Closure,
        context: &mut dyn Context,
    ) -> Result<ExecResult, RuntimeError> {
        match statement {
            Statement::Assignment { var, value } => {
                let value = self.eval_expression(value, closure, context)?;
                closure.insert(var.clone(), value);
                Ok(ExecResult::Continue)
            }
            Statement::FieldAssignment {
                object,
                field,
                value,
            } => {
                let object = self.load_variable(object, closure)?;
                let Some(instance) = object.as_instance() else {
                    return Err(RuntimeError::FieldAccessOnNonInstance {
                        name: field.clone(),
                        type_name: object.type_name(),
                    });
                };
                let instance = Rc::clone(instance);
                let value = self.eval_expression(value, closure, context)?;
                instance.set_field(field.clone(), value);
                Ok(ExecResult::Continue)
            }
            Statement::Print(args) => {
                for (index, arg) in args.iter().enumerate() {
                    if index > 0 {
                        self.write_output(" ", context)?;
                    }
                    let value = self.eval_expression(arg, closure, context)?;
                    let text = self.render(&value, context)?;
                    self.write_output(&text, context)?;
                }
                self.write_output("\n", context)?;
                Ok(ExecResult::Continue)
            }
            Statement::Return(value) => {
                let value = self.eval_expression(value, closure, context)?;
                Ok(ExecResult::Return(value))
            }
            Statement::ClassDefinition(class) => {
                closure.insert(class.name().to_string(), Value::Class(Rc::clone(class)));
                Ok(ExecResult::Continue)
            }
            Statement::IfElse {
                condition,
                then_body,
                else_body,
            } => {
                let condition = self.eval_expression(condition, closure, context)?;
                let body = if condition.is_truthy() {
                    then_body
                } else {
                    else_body
                };
                self.exec_block(body, closure, context)
            }
            Statement::Expr(expr) => {
                self.eval_expression(expr, closure, context)?;
                Ok(ExecResult::Continue)
            }
        }
    }

    fn eval_expression(
        &self,
        expr: &Expression,
        closure: &mut Closure,
        context: &mut dyn Context,
    ) -> Result<Value, RuntimeError> {
        match expr {
            Expression::Number(value) => Ok(Value::Number(*value)),
            Expression::Str(text) => Ok(Value::string(text.as_str())),
            Expression::Bool(value) => Ok(Value::Bool(*value)),
            Expression::None => Ok(Value::None),
            Expression::Variable(path) => self.load_variable(path, closure),
            Expression::Stringify(argument) => {
                let value = self.eval_expression(argument, closure, context)?;
                self.stringify(&value, context)
            }
            Expression::MethodCall {
                object,
                method,
                args,
            } => {
                let object = self.eval_expression(object, closure, context)?;
                let Some(instance) = object.as_instance() else {
                    return Err(RuntimeError::MethodCallOnNonInstance {
                        method: method.clone(),
                        type_name: object.type_name(),
                    });
                };
                let instance = Rc::clone(instance);
                let mut call_args = Vec::with_capacity(args.len());
                for arg in args {
                    call_args.push(self.eval_expression(arg, closure, context)?);
                }
                self.call_method(&instance, method, call_args, context)
            }
            Expression::NewInstance { class, args } => {
                let instance = Rc::new(Instance::new(Rc::clone(class)));
                // Without a matching constructor the arguments are not
                // even evaluated; the instance starts out field-less.
                let arity_matches = class
                    .method(INIT_METHOD)
                    .is_some_and(|init| init.formal_params.len() == args.len());
                if !arity_matches {
                    return Ok(Value::Instance(instance));
                }
                let mut call_args = Vec::with_capacity(args.len());
                for arg in args {
                    call_args.push(self.eval_expression(arg, closure, context)?);
                }
                match self.call_method(&instance, INIT_METHOD, call_args, context)? {
                    Value::None => Ok(Value::Instance(instance)),
                    rebound => Ok(rebound),
                }
            }
            Expression::Not(argument) => {
                let value = self.eval_expression(argument, closure, context)?;
                Ok(Value::Bool(!value.is_truthy()))
            }
            Expression::Arithmetic { op, left, right } => {
                let left = self.eval_expression(left, closure, context)?;
                let right = self.eval_expression(right, closure, context)?;
                match op {
                    ArithmeticOp::Add => self.add(left, right, context),
                    _ => self.numeric(*op, &left, &right),
                }
            }
            Expression::Logical { op, left, right } => {
                let left = self.eval_expression(left, closure, context)?.is_truthy();
                let result = match op {
                    LogicalOp::And => {
                        left && self.eval_expression(right, closure, context)?.is_truthy()
                    }
                    LogicalOp::Or => {
                        left || self.eval_expression(right, closure, context)?.is_truthy()
                    }
                };
                Ok(Value::Bool(result))
            }
            Expression::Comparison { op, left, right } => {
                let left = self.eval_expression(left, closure, context)?;
                let right = self.eval_expression(right, closure, context)?;
                let result = self.compare(*op, &left, &right, context)?;
                Ok(Value::Bool(result))
            }
        }
    }

    /// Walks a dotted read path: the head resolves in the closure, every
    /// further segment in the fields of the instance reached so far.
    fn load_variable(
        &self,
        path: &VariablePath,
        closure: &Closure,
    ) -> Result<Value, RuntimeError> {
        let mut value = closure
            .get(&path.name)
            .cloned()
            .ok_or_else(|| RuntimeError::UnknownVariable {
                name: path.name.clone(),
            })?;
        for field in &path.fields {
            let Some(instance) = value.as_instance() else {
                return Err(RuntimeError::FieldAccessOnNonInstance {
                    name: field.clone(),
                    type_name: value.type_name(),
                });
            };
            let next = instance
                .field(field)
                .ok_or_else(|| RuntimeError::UnknownField {
                    field: field.clone(),
                    class: instance.class().name().to_string(),
                })?;
            value = next;
        }
        Ok(value)
    }

    /// Calls `instance.method(args)`:
    /// arity check, fresh scope binding `self` plus the formals, body
    /// execution, then the rebind check — a method that replaced `self`
    /// in its scope returns the replacement instead of the body result.
    fn call_method(
        &self,
        instance: &Rc<Instance>,
        method: &str,
        args: Vec<Value>,
        context: &mut dyn Context,
    ) -> Result<Value, RuntimeError> {
        let class = Rc::clone(instance.class());
        let Some(found) = class.method(method) else {
            return Err(RuntimeError::UnknownMethod {
                method: method.to_string(),
                class: class.name().to_string(),
            });
        };
        if found.formal_params.len() != args.len() {
            return Err(RuntimeError::MethodArityMismatch {
                method: method.to_string(),
                class: class.name().to_string(),
                expected: found.formal_params.len(),
                found: args.len(),
            });
        }

        let mut locals = Closure::new();
        locals.insert(SELF_NAME.to_string(), Value::Instance(Rc::clone(instance)));
        for (param, value) in found.formal_params.iter().zip(args) {
            locals.insert(param.clone(), value);
        }

        let result = match self.exec_block(&found.body, &mut locals, context)? {
            ExecResult::Continue => Value::None,
            ExecResult::Return(value) => value,
        };

        if let Some(bound_self) = locals.get(SELF_NAME)
            && !is_same_instance(bound_self, instance)
        {
            return Ok(bound_self.clone());
        }
        Ok(result)
    }

    /// `str(x)`: instances with a 0-arg `__str__` render through the hook,
    /// everything else renders directly. Produces a value, never output.
    fn stringify(
        &self,
        value: &Value,
        context: &mut dyn Context,
    ) -> Result<Value, RuntimeError> {
        let text = match value {
            Value::Instance(instance) if instance.has_method(STR_METHOD, 0) => {
                let result = self.call_method(instance, STR_METHOD, Vec::new(), context)?;
                self.render(&result, context)?
            }
            other => self.render(other, context)?,
        };
        Ok(Value::string(text))
    }

    fn add(
        &self,
        left: Value,
        right: Value,
        context: &mut dyn Context,
    ) -> Result<Value, RuntimeError> {
        match (&left, &right) {
            (Value::Number(_), Value::Number(_)) => {
                self.numeric(ArithmeticOp::Add, &left, &right)
            }
            (Value::Str(left_text), Value::Str(right_text)) => {
                let mut text = left_text.to_string();
                text.push_str(right_text);
                Ok(Value::string(text))
            }
            (Value::Instance(instance), _) if instance.has_method(ADD_METHOD, 1) => {
                let instance = Rc::clone(instance);
                self.call_method(&instance, ADD_METHOD, vec![right.clone()], context)
            }
            _ => Err(RuntimeError::UnsupportedOperands {
                operation: "+",
                left: left.type_name(),
                right: right.type_name(),
            }),
        }
    }

    fn numeric(
        &self,
        op: ArithmeticOp,
        left: &Value,
        right: &Value,
    ) -> Result<Value, RuntimeError> {
        let (Value::Number(left_n), Value::Number(right_n)) = (left, right) else {
            return Err(RuntimeError::UnsupportedOperands {
                operation: op.symbol(),
                left: left.type_name(),
                right: right.type_name(),
            });
        };
        let result = match op {
            ArithmeticOp::Add => left_n + right_n,
            ArithmeticOp::Sub => left_n - right_n,
            ArithmeticOp::Mul => left_n * right_n,
            ArithmeticOp::Div => {
                if *right_n == 0 {
                    return Err(RuntimeError::DivisionByZero);
                }
                left_n / right_n
            }
        };
        Ok(Value::Number(result))
    }

    fn compare(
        &self,
        op: ComparisonOp,
        left: &Value,
        right: &Value,
        context: &mut dyn Context,
    ) -> Result<bool, RuntimeError> {
        match op {
            ComparisonOp::Equal => self.equal(left, right, context),
            ComparisonOp::NotEqual => Ok(!self.equal(left, right, context)?),
            ComparisonOp::Less => self.less(left, right, context),
            ComparisonOp::Greater => {
                // Both primitives run so that an error from either side
                // surfaces regardless of the first one's answer.
                let equal = self.equal(left, right, context)?;
                let less = self.less(left, right, context)?;
                Ok(!equal && !less)
            }
            ComparisonOp::LessOrEqual => {
                Ok(!self.compare(ComparisonOp::Greater, left, right, context)?)
            }
            ComparisonOp::GreaterOrEqual => Ok(!self.less(left, right, context)?),
        }
    }

    /// Equality primitive: both-None, matching scalar kinds, or a
    /// user-defined `__eq__` hook on a left-hand instance.
    fn equal(
        &self,
        left: &Value,
        right: &Value,
        context: &mut dyn Context,
    ) -> Result<bool, RuntimeError> {
        match (left, right) {
            (Value::None, Value::None) => Ok(true),
            (Value::Bool(left_b), Value::Bool(right_b)) => Ok(left_b == right_b),
            (Value::Number(left_n), Value::Number(right_n)) => Ok(left_n == right_n),
            (Value::Str(left_s), Value::Str(right_s)) => Ok(left_s == right_s),
            (Value::Instance(instance), _) if instance.has_method(EQ_METHOD, 1) => {
                let instance = Rc::clone(instance);
                let result =
                    self.call_method(&instance, EQ_METHOD, vec![right.clone()], context)?;
                Ok(result.is_truthy())
            }
            _ => Err(RuntimeError::ComparisonNotSupported {
                operation: "==",
                left: left.type_name(),
                right: right.type_name(),
            }),
        }
    }

    /// Ordering primitive; not defined over None.
    fn less(
        &self,
        left: &Value,
        right: &Value,
        context: &mut dyn Context,
    ) -> Result<bool, RuntimeError> {
        match (left, right) {
            (Value::Bool(left_b), Value::Bool(right_b)) => Ok(left_b < right_b),
            (Value::Number(left_n), Value::Number(right_n)) => Ok(left_n < right_n),
            (Value::Str(left_s), Value::Str(right_s)) => Ok(left_s < right_s),
            (Value::Instance(instance), _) if instance.has_method(LT_METHOD, 1) => {
                let instance = Rc::clone(instance);
                let result =
                    self.call_method(&instance, LT_METHOD, vec![right.clone()], context)?;
                Ok(result.is_truthy())
            }
            _ => Err(RuntimeError::ComparisonNotSupported {
                operation: "<",
                left: left.type_name(),
                right: right.type_name(),
            }),
        }
    }

    fn write_output(&self, text: &str, context: &mut dyn Context) -> Result<(), RuntimeError> {
        context
            .write(text)
            .map_err(|error| RuntimeError::OutputWrite {
                message: error.to_string(),
            })
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

fn is_same_instance(value: &Value, instance: &Rc<Instance>) -> bool {
    matches!(value, Value::Instance(bound) if Rc::ptr_eq(bound, instance))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{Class, Method};

    fn int(value: i64) -> Expression {
        Expression::Number(value)
    }

    fn text(value: &str) -> Expression {
        Expression::Str(value.to_string())
    }

    fn variable(name: &str) -> Expression {
        Expression::Variable(VariablePath {
            name: name.to_string(),
            fields: Vec::new(),
        })
    }

    fn assign(name: &str, value: Expression) -> Statement {
        Statement::Assignment {
            var: name.to_string(),
            value,
        }
    }

    fn print(args: Vec<Expression>) -> Statement {
        Statement::Print(args)
    }

    fn arithmetic(op: ArithmeticOp, left: Expression, right: Expression) -> Expression {
        Expression::Arithmetic {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn comparison(op: ComparisonOp, left: Expression, right: Expression) -> Expression {
        Expression::Comparison {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn method(name: &str, params: &[&str], body: Vec<Statement>) -> Method {
        Method {
            name: name.to_string(),
            formal_params: params.iter().map(|p| p.to_string()).collect(),
            body,
        }
    }

    fn class(name: &str, methods: Vec<Method>) -> Rc<Class> {
        Rc::new(Class::new(name.to_string(), methods, None))
    }

    fn run_program(statements: Vec<Statement>) -> Result<(Value, String), RuntimeError> {
        let program = Program { statements };
        let mut context = BufferContext::new();
        let result = Interpreter::new().run(&program, &mut context)?;
        Ok((result, context.output().to_string()))
    }

    fn run_output(statements: Vec<Statement>) -> String {
        let (_, output) = run_program(statements).expect("run failed");
        output
    }

    fn run_error(statements: Vec<Statement>) -> RuntimeError {
        run_program(statements).expect_err("expected runtime error")
    }

    #[test]
    fn prints_each_value_kind_in_its_output_form() {
        let output = run_output(vec![print(vec![
            int(42),
            text("hi"),
            Expression::Bool(true),
            Expression::Bool(false),
            Expression::None,
        ])]);
        assert_eq!(output, "42 hi True False None\n");
    }

    #[test]
    fn empty_print_emits_a_blank_line() {
        assert_eq!(run_output(vec![print(Vec::new())]), "\n");
    }

    #[test]
    fn assignment_binds_and_reads_back() {
        let output = run_output(vec![
            assign("x", arithmetic(ArithmeticOp::Add, int(1), int(2))),
            print(vec![variable("x")]),
        ]);
        assert_eq!(output, "3\n");
    }

    #[test]
    fn reading_an_unknown_variable_fails() {
        let err = run_error(vec![print(vec![variable("missing")])]);
        assert_eq!(
            err,
            RuntimeError::UnknownVariable {
                name: "missing".to_string()
            }
        );
    }

    #[test]
    fn arithmetic_follows_integer_semantics() {
        let output = run_output(vec![print(vec![
            arithmetic(ArithmeticOp::Sub, int(7), int(10)),
            arithmetic(ArithmeticOp::Mul, int(6), int(7)),
            arithmetic(ArithmeticOp::Div, int(7), int(2)),
        ])]);
        assert_eq!(output, "-3 42 3\n");
    }

    #[test]
    fn string_addition_concatenates() {
        let output = run_output(vec![print(vec![arithmetic(
            ArithmeticOp::Add,
            text("ab"),
            text("cd"),
        )])]);
        assert_eq!(output, "abcd\n");
    }

    #[test]
    fn mixed_operand_addition_fails() {
        let err = run_error(vec![print(vec![arithmetic(
            ArithmeticOp::Add,
            int(1),
            text("x"),
        )])]);
        assert_eq!(
            err,
            RuntimeError::UnsupportedOperands {
                operation: "+",
                left: "int",
                right: "str",
            }
        );
    }

    #[test]
    fn division_by_zero_fails() {
        let err = run_error(vec![print(vec![arithmetic(
            ArithmeticOp::Div,
            int(1),
            int(0),
        )])]);
        assert_eq!(err, RuntimeError::DivisionByZero);
    }

    #[test]
    fn logical_operators_short_circuit() {
        // The right operand would fail if evaluated.
        let and_result = run_output(vec![print(vec![Expression::Logical {
            op: LogicalOp::And,
            left: Box::new(Expression::Bool(false)),
            right: Box::new(variable("missing")),
        }])]);
        assert_eq!(and_result, "False\n");

        let or_result = run_output(vec![print(vec![Expression::Logical {
            op: LogicalOp::Or,
            left: Box::new(int(1)),
            right: Box::new(variable("missing")),
        }])]);
        assert_eq!(or_result, "True\n");

        let err = run_error(vec![print(vec![Expression::Logical {
            op: LogicalOp::Or,
            left: Box::new(int(0)),
            right: Box::new(variable("missing")),
        }])]);
        assert_eq!(
            err,
            RuntimeError::UnknownVariable {
                name: "missing".to_string()
            }
        );
    }

    #[test]
    fn not_negates_truthiness() {
        let output = run_output(vec![print(vec![
            Expression::Not(Box::new(int(0))),
            Expression::Not(Box::new(text("x"))),
        ])]);
        assert_eq!(output, "True False\n");
    }

    #[test]
    fn comparison_relations_derive_from_equal_and_less() {
        let output = run_output(vec![print(vec![
            comparison(ComparisonOp::Equal, int(2), int(2)),
            comparison(ComparisonOp::NotEqual, int(2), int(2)),
            comparison(ComparisonOp::Less, int(1), int(2)),
            comparison(ComparisonOp::Greater, int(1), int(2)),
            comparison(ComparisonOp::LessOrEqual, int(2), int(2)),
            comparison(ComparisonOp::GreaterOrEqual, int(1), int(2)),
        ])]);
        assert_eq!(output, "True False True False True False\n");
    }

    #[test]
    fn none_equals_only_none() {
        let output = run_output(vec![print(vec![comparison(
            ComparisonOp::Equal,
            Expression::None,
            Expression::None,
        )])]);
        assert_eq!(output, "True\n");

        let err = run_error(vec![print(vec![comparison(
            ComparisonOp::Equal,
            Expression::None,
            int(0),
        )])]);
        assert_eq!(
            err,
            RuntimeError::ComparisonNotSupported {
                operation: "==",
                left: "NoneType",
                right: "int",
            }
        );
    }

    #[test]
    fn booleans_and_numbers_do_not_cross_compare() {
        let err = run_error(vec![print(vec![comparison(
            ComparisonOp::Equal,
            Expression::Bool(false),
            int(0),
        )])]);
        assert_eq!(
            err,
            RuntimeError::ComparisonNotSupported {
                operation: "==",
                left: "bool",
                right: "int",
            }
        );
    }

    #[test]
    fn strings_compare_lexicographically() {
        let output = run_output(vec![print(vec![
            comparison(ComparisonOp::Less, text("abc"), text("abd")),
            comparison(ComparisonOp::GreaterOrEqual, text("b"), text("ab")),
        ])]);
        assert_eq!(output, "True True\n");
    }

    #[test]
    fn class_values_print_with_their_name() {
        let cls = class("Point", Vec::new());
        let output = run_output(vec![
            Statement::ClassDefinition(Rc::clone(&cls)),
            print(vec![variable("Point")]),
        ]);
        assert_eq!(output, "Class Point\n");
    }

    #[test]
    fn instances_without_str_hook_print_an_address_form() {
        let cls = class("Point", Vec::new());
        let output = run_output(vec![
            Statement::ClassDefinition(Rc::clone(&cls)),
            assign(
                "p",
                Expression::NewInstance {
                    class: cls,
                    args: Vec::new(),
                },
            ),
            print(vec![variable("p")]),
        ]);
        assert!(output.starts_with("<Point object at "));
        assert!(output.ends_with(">\n"));
    }

    #[test]
    fn method_call_binds_self_and_formals() {
        let cls = class(
            "Adder",
            vec![method(
                "apply",
                &["amount"],
                vec![
                    Statement::FieldAssignment {
                        object: VariablePath {
                            name: "self".to_string(),
                            fields: Vec::new(),
                        },
                        field: "total".to_string(),
                        value: variable("amount"),
                    },
                    Statement::Return(Expression::Variable(VariablePath {
                        name: "self".to_string(),
                        fields: vec!["total".to_string()],
                    })),
                ],
            )],
        );
        let output = run_output(vec![
            assign(
                "a",
                Expression::NewInstance {
                    class: cls,
                    args: Vec::new(),
                },
            ),
            print(vec![Expression::MethodCall {
                object: Box::new(variable("a")),
                method: "apply".to_string(),
                args: vec![int(5)],
            }]),
        ]);
        assert_eq!(output, "5\n");
    }

    #[test]
    fn calling_a_missing_method_fails() {
        let cls = class("Empty", Vec::new());
        let err = run_error(vec![
            assign(
                "e",
                Expression::NewInstance {
                    class: cls,
                    args: Vec::new(),
                },
            ),
            Statement::Expr(Expression::MethodCall {
                object: Box::new(variable("e")),
                method: "f".to_string(),
                args: Vec::new(),
            }),
        ]);
        assert_eq!(
            err,
            RuntimeError::UnknownMethod {
                method: "f".to_string(),
                class: "Empty".to_string(),
            }
        );
    }

    #[test]
    fn calling_with_wrong_arity_fails() {
        let cls = class("Pair", vec![method("m", &["a", "b"], Vec::new())]);
        let err = run_error(vec![
            assign(
                "p",
                Expression::NewInstance {
                    class: cls,
                    args: Vec::new(),
                },
            ),
            Statement::Expr(Expression::MethodCall {
                object: Box::new(variable("p")),
                method: "m".to_string(),
                args: vec![int(1)],
            }),
        ]);
        assert_eq!(
            err,
            RuntimeError::MethodArityMismatch {
                method: "m".to_string(),
                class: "Pair".to_string(),
                expected: 2,
                found: 1,
            }
        );
    }

    #[test]
    fn method_call_on_non_instance_fails() {
        let err = run_error(vec![Statement::Expr(Expression::MethodCall {
            object: Box::new(int(5)),
            method: "f".to_string(),
            args: Vec::new(),
        })]);
        assert_eq!(
            err,
            RuntimeError::MethodCallOnNonInstance {
                method: "f".to_string(),
                type_name: "int",
            }
        );
    }

    #[test]
    fn method_without_return_yields_none() {
        let cls = class("Quiet", vec![method("f", &[], vec![print(vec![int(1)])])]);
        let output = run_output(vec![
            assign(
                "q",
                Expression::NewInstance {
                    class: cls,
                    args: Vec::new(),
                },
            ),
            print(vec![Expression::MethodCall {
                object: Box::new(variable("q")),
                method: "f".to_string(),
                args: Vec::new(),
            }]),
        ]);
        assert_eq!(output, "1\nNone\n");
    }

    #[test]
    fn return_stops_the_rest_of_the_body() {
        let cls = class(
            "Early",
            vec![method(
                "f",
                &[],
                vec![
                    Statement::Return(int(7)),
                    print(vec![text("unreachable")]),
                ],
            )],
        );
        let output = run_output(vec![
            assign(
                "e",
                Expression::NewInstance {
                    class: cls,
                    args: Vec::new(),
                },
            ),
            print(vec![Expression::MethodCall {
                object: Box::new(variable("e")),
                method: "f".to_string(),
                args: Vec::new(),
            }]),
        ]);
        assert_eq!(output, "7\n");
    }

    #[test]
    fn rebinding_self_replaces_the_call_result() {
        let cls = class(
            "Shifty",
            vec![method("f", &[], vec![assign("self", int(42))])],
        );
        let output = run_output(vec![
            assign(
                "s",
                Expression::NewInstance {
                    class: cls,
                    args: Vec::new(),
                },
            ),
            print(vec![Expression::MethodCall {
                object: Box::new(variable("s")),
                method: "f".to_string(),
                args: Vec::new(),
            }]),
        ]);
        assert_eq!(output, "42\n");
    }

    #[test]
    fn constructor_args_are_skipped_when_arity_differs() {
        // One bogus argument to a class without __init__: the instance is
        // created bare and the argument never evaluates.
        let cls = class("Bare", Vec::new());
        let output = run_output(vec![
            assign(
                "b",
                Expression::NewInstance {
                    class: cls,
                    args: vec![variable("missing")],
                },
            ),
            print(vec![int(1)]),
        ]);
        assert_eq!(output, "1\n");
    }

    #[test]
    fn stringify_renders_without_printing() {
        let (_, output) = run_program(vec![assign(
            "s",
            Expression::Stringify(Box::new(int(5))),
        )])
        .expect("run failed");
        assert_eq!(output, "");
    }

    #[test]
    fn stringify_of_none_and_scalars() {
        let output = run_output(vec![print(vec![arithmetic(
            ArithmeticOp::Add,
            Expression::Stringify(Box::new(Expression::None)),
            Expression::Stringify(Box::new(int(3))),
        )])]);
        assert_eq!(output, "None3\n");
    }

    #[test]
    fn top_level_return_stops_the_program_and_yields_its_value() {
        let (result, output) = run_program(vec![
            Statement::Return(int(9)),
            print(vec![text("unreachable")]),
        ])
        .expect("run failed");
        assert_eq!(output, "");
        assert!(matches!(result, Value::Number(9)));
    }

    #[test]
    fn if_else_picks_the_branch_by_truthiness() {
        let output = run_output(vec![Statement::IfElse {
            condition: text(""),
            then_body: vec![print(vec![text("t")])],
            else_body: vec![print(vec![text("f")])],
        }]);
        assert_eq!(output, "f\n");
    }

    #[test]
    fn return_unwinds_through_if_bodies() {
        let cls = class(
            "Chooser",
            vec![method(
                "pick",
                &["flag"],
                vec![
                    Statement::IfElse {
                        condition: variable("flag"),
                        then_body: vec![Statement::Return(int(1))],
                        else_body: Vec::new(),
                    },
                    Statement::Return(int(2)),
                ],
            )],
        );
        let output = run_output(vec![
            assign(
                "c",
                Expression::NewInstance {
                    class: Rc::clone(&cls),
                    args: Vec::new(),
                },
            ),
            print(vec![Expression::MethodCall {
                object: Box::new(variable("c")),
                method: "pick".to_string(),
                args: vec![Expression::Bool(true)],
            }]),
            print(vec![Expression::MethodCall {
                object: Box::new(variable("c")),
                method: "pick".to_string(),
                args: vec![Expression::Bool(false)],
            }]),
        ]);
        assert_eq!(output, "1\n2\n");
    }

    #[test]
    fn field_assignment_requires_an_instance() {
        let err = run_error(vec![
            assign("n", int(3)),
            Statement::FieldAssignment {
                object: VariablePath {
                    name: "n".to_string(),
                    fields: Vec::new(),
                },
                field: "x".to_string(),
                value: int(1),
            },
        ]);
        assert_eq!(
            err,
            RuntimeError::FieldAccessOnNonInstance {
                name: "x".to_string(),
                type_name: "int",
            }
        );
    }

    #[test]
    fn reading_a_missing_field_fails() {
        let cls = class("Bare", Vec::new());
        let err = run_error(vec![
            assign(
                "b",
                Expression::NewInstance {
                    class: cls,
                    args: Vec::new(),
                },
            ),
            print(vec![Expression::Variable(VariablePath {
                name: "b".to_string(),
                fields: vec!["x".to_string()],
            })]),
        ]);
        assert_eq!(
            err,
            RuntimeError::UnknownField {
                field: "x".to_string(),
                class: "Bare".to_string(),
            }
        );
    }
}

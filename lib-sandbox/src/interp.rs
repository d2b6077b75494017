//! AST evaluator with fuel, heap and wall-clock accounting.
//!
//! Determinism contract: fuel is charged per evaluation step, so identical
//! (source, environment, arguments, limits) exhaust at the identical step and
//! produce identical results. The wall clock is consulted only as a teardown
//! backstop and is never observable from contract code.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Instant;

use crate::ast::{AssignOp, BinOp, ClassDecl, Expr, MethodDecl, Program, Stmt, UnaryOp};
use crate::error::{SandboxError, SandboxResult};
use crate::limits::Limits;
use crate::value::{
    display_value, is_truthy, snapshot_fields, values_equal, DataRecord, DataValue, Instance,
    Value,
};

/// A registered class: name, parent and methods in declaration order
pub(crate) struct ClassDef {
    pub name: String,
    pub parent: Option<String>,
    pub methods: Vec<Rc<MethodDecl>>,
}

impl ClassDef {
    fn own_method(&self, name: &str) -> Option<&Rc<MethodDecl>> {
        self.methods.iter().find(|m| m.name == name)
    }
}

/// Statement outcome inside a call frame
enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

/// One call frame: block scopes plus the receiver and its defining class
struct Frame {
    scopes: Vec<BTreeMap<String, Value>>,
    this: Option<Rc<RefCell<Instance>>>,
    /// Class that lexically defines the executing method; anchors `super`
    class: Option<String>,
}

impl Frame {
    fn top_level() -> Self {
        Frame {
            scopes: vec![BTreeMap::new()],
            this: None,
            class: None,
        }
    }

    fn for_method(this: Rc<RefCell<Instance>>, class: String) -> Self {
        Frame {
            scopes: vec![BTreeMap::new()],
            this: Some(this),
            class: Some(class),
        }
    }
}

pub(crate) struct Interp<'a> {
    limits: &'a Limits,
    classes: BTreeMap<String, Rc<ClassDef>>,
    globals: BTreeMap<String, Value>,
    steps: u64,
    heap_cells: usize,
    deadline: Instant,
}

impl<'a> Interp<'a> {
    pub(crate) fn new(limits: &'a Limits) -> Self {
        Interp {
            limits,
            classes: BTreeMap::new(),
            globals: BTreeMap::new(),
            steps: 0,
            heap_cells: 0,
            deadline: Instant::now() + limits.timeout,
        }
    }

    pub(crate) fn fuel_used(&self) -> u64 {
        self.steps
    }

    pub(crate) fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    /// Whether `class` transitively extends `Base`
    pub(crate) fn extends_base(&self, class: &str) -> bool {
        let mut current = self.classes.get(class);
        while let Some(def) = current {
            match def.parent.as_deref() {
                Some("Base") => return self.classes.contains_key("Base"),
                Some(parent) => current = self.classes.get(parent),
                None => return false,
            }
        }
        false
    }

    /// Bind environment-record values as globals before execution
    pub(crate) fn bind_globals(&mut self, env: &DataRecord) -> SandboxResult<()> {
        let values: Vec<(String, Value)> = env
            .iter()
            .map(|(name, value)| Ok((name.clone(), self.import_data(value)?)))
            .collect::<SandboxResult<_>>()?;
        self.globals.extend(values);
        Ok(())
    }

    // =========================================================================
    // Accounting
    // =========================================================================

    fn charge(&mut self) -> SandboxResult<()> {
        self.steps += 1;
        if self.steps > self.limits.fuel {
            return Err(SandboxError::OutOfFuel);
        }
        if (self.steps & 0xff) == 0 && Instant::now() > self.deadline {
            return Err(SandboxError::Timeout);
        }
        Ok(())
    }

    fn alloc(&mut self, cells: usize) -> SandboxResult<()> {
        self.heap_cells = self.heap_cells.saturating_add(cells);
        if self.heap_cells > self.limits.max_heap_cells {
            return Err(SandboxError::MemoryLimit);
        }
        Ok(())
    }

    /// Deep-copy persisted data into a runtime value, charging the heap
    pub(crate) fn import_data(&mut self, data: &DataValue) -> SandboxResult<Value> {
        self.alloc(1)?;
        Ok(match data {
            DataValue::Null => Value::Null,
            DataValue::Bool(b) => Value::Bool(*b),
            DataValue::Int(n) => Value::Int(*n),
            DataValue::Str(s) => Value::Str(Rc::from(s.as_str())),
            DataValue::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.import_data(item)?);
                }
                Value::List(Rc::new(RefCell::new(out)))
            }
            DataValue::Record(map) => {
                let mut out = BTreeMap::new();
                for (key, value) in map {
                    out.insert(key.clone(), self.import_data(value)?);
                }
                Value::Record(Rc::new(RefCell::new(out)))
            }
        })
    }

    // =========================================================================
    // Program execution
    // =========================================================================

    pub(crate) fn run(&mut self, program: &Program) -> SandboxResult<()> {
        // Classes are registered up front so top-level code may instantiate
        // them regardless of declaration order.
        for stmt in &program.stmts {
            if let Stmt::Class(decl) = stmt {
                self.register_class(decl)?;
            }
        }

        let mut frame = Frame::top_level();
        for stmt in &program.stmts {
            if matches!(stmt, Stmt::Class(_)) {
                continue;
            }
            match self.exec_stmt(stmt, &mut frame)? {
                Flow::Normal => {}
                Flow::Return(_) => {
                    return Err(SandboxError::Runtime(
                        "return outside of method".to_string(),
                    ))
                }
                Flow::Break | Flow::Continue => {
                    return Err(SandboxError::Runtime(
                        "break/continue outside of loop".to_string(),
                    ))
                }
            }
        }
        Ok(())
    }

    fn register_class(&mut self, decl: &ClassDecl) -> SandboxResult<()> {
        self.charge()?;
        if self.classes.contains_key(&decl.name) {
            return Err(SandboxError::Runtime(format!(
                "class {} already defined",
                decl.name
            )));
        }
        if let Some(parent) = &decl.parent {
            if !self.classes.contains_key(parent) {
                return Err(SandboxError::Runtime(format!(
                    "unknown parent class {parent}"
                )));
            }
        }
        let def = ClassDef {
            name: decl.name.clone(),
            parent: decl.parent.clone(),
            methods: decl.methods.iter().cloned().map(Rc::new).collect(),
        };
        self.classes.insert(decl.name.clone(), Rc::new(def));
        Ok(())
    }

    // =========================================================================
    // Host entry points
    // =========================================================================

    /// Instantiate a registered class with the given arguments
    pub(crate) fn instantiate(
        &mut self,
        class: &str,
        args: &[Value],
    ) -> SandboxResult<Rc<RefCell<Instance>>> {
        self.charge()?;
        self.alloc(1)?;
        if !self.classes.contains_key(class) {
            return Err(SandboxError::Runtime(format!("unknown class {class}")));
        }
        let instance = Rc::new(RefCell::new(Instance {
            class: class.to_string(),
            fields: BTreeMap::new(),
        }));
        if let Some((defining, ctor)) = self.find_method(class, "constructor") {
            self.call_decl(&ctor, Rc::clone(&instance), defining, args)?;
        }
        Ok(instance)
    }

    /// Call a named method on an instance; fails with `UnknownMethod` if the
    /// class chain does not define it
    pub(crate) fn call_method_by_name(
        &mut self,
        instance: &Rc<RefCell<Instance>>,
        method: &str,
        args: &[Value],
    ) -> SandboxResult<Value> {
        let class = instance.borrow().class.clone();
        let (defining, decl) = self
            .find_method(&class, method)
            .ok_or_else(|| SandboxError::UnknownMethod(method.to_string()))?;
        self.call_decl(&decl, Rc::clone(instance), defining, args)
    }

    /// Overwrite instance fields from persisted data
    pub(crate) fn assign_fields(
        &mut self,
        instance: &Rc<RefCell<Instance>>,
        data: &DataRecord,
    ) -> SandboxResult<()> {
        for (key, value) in data {
            let imported = self.import_data(value)?;
            instance.borrow_mut().fields.insert(key.clone(), imported);
        }
        Ok(())
    }

    /// Snapshot instance fields into persisted form
    pub(crate) fn snapshot_instance(
        &self,
        instance: &Rc<RefCell<Instance>>,
    ) -> SandboxResult<DataRecord> {
        snapshot_fields(&instance.borrow().fields, 0)
    }

    /// Own (non-inherited) methods of a class, constructor excluded,
    /// in declaration order
    pub(crate) fn own_methods(&self, class: &str) -> Vec<Rc<MethodDecl>> {
        self.classes
            .get(class)
            .map(|def| {
                def.methods
                    .iter()
                    .filter(|m| m.name != "constructor")
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    // =========================================================================
    // Method dispatch
    // =========================================================================

    /// Resolve a method through the class chain; returns the defining class
    fn find_method(&self, class: &str, name: &str) -> Option<(String, Rc<MethodDecl>)> {
        let mut current = self.classes.get(class);
        while let Some(def) = current {
            if let Some(method) = def.own_method(name) {
                return Some((def.name.clone(), Rc::clone(method)));
            }
            current = def.parent.as_deref().and_then(|p| self.classes.get(p));
        }
        None
    }

    fn call_decl(
        &mut self,
        decl: &Rc<MethodDecl>,
        this: Rc<RefCell<Instance>>,
        defining_class: String,
        args: &[Value],
    ) -> SandboxResult<Value> {
        self.charge()?;
        let mut frame = Frame::for_method(this, defining_class);
        for (i, param) in decl.params.iter().enumerate() {
            let value = args.get(i).cloned().unwrap_or(Value::Null);
            frame.scopes[0].insert(param.clone(), value);
        }
        match self.exec_stmts(&decl.body, &mut frame)? {
            Flow::Return(value) => Ok(value),
            Flow::Normal => Ok(Value::Null),
            Flow::Break | Flow::Continue => Err(SandboxError::Runtime(
                "break/continue outside of loop".to_string(),
            )),
        }
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn exec_stmts(&mut self, stmts: &[Stmt], frame: &mut Frame) -> SandboxResult<Flow> {
        for stmt in stmts {
            match self.exec_stmt(stmt, frame)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_block(&mut self, stmts: &[Stmt], frame: &mut Frame) -> SandboxResult<Flow> {
        frame.scopes.push(BTreeMap::new());
        let flow = self.exec_stmts(stmts, frame);
        frame.scopes.pop();
        flow
    }

    fn exec_stmt(&mut self, stmt: &Stmt, frame: &mut Frame) -> SandboxResult<Flow> {
        self.charge()?;
        match stmt {
            Stmt::Class(_) => Err(SandboxError::Runtime(
                "class declarations are only permitted at the top level".to_string(),
            )),
            Stmt::Let { name, init } => {
                let value = match init {
                    Some(expr) => self.eval(expr, frame)?,
                    None => Value::Null,
                };
                frame
                    .scopes
                    .last_mut()
                    .expect("frame has at least one scope")
                    .insert(name.clone(), value);
                Ok(Flow::Normal)
            }
            Stmt::Expr(expr) => {
                self.eval(expr, frame)?;
                Ok(Flow::Normal)
            }
            Stmt::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, frame)?,
                    None => Value::Null,
                };
                Ok(Flow::Return(value))
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let cond = self.eval(cond, frame)?;
                if is_truthy(&cond) {
                    self.exec_block(then_branch, frame)
                } else if let Some(else_branch) = else_branch {
                    self.exec_block(else_branch, frame)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::While { cond, body } => {
                loop {
                    self.charge()?;
                    let cond = self.eval(cond, frame)?;
                    if !is_truthy(&cond) {
                        break;
                    }
                    match self.exec_block(body, frame)? {
                        Flow::Normal | Flow::Continue => {}
                        Flow::Break => break,
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Break => Ok(Flow::Break),
            Stmt::Continue => Ok(Flow::Continue),
            Stmt::Block(stmts) => self.exec_block(stmts, frame),
        }
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn eval(&mut self, expr: &Expr, frame: &mut Frame) -> SandboxResult<Value> {
        self.charge()?;
        match expr {
            Expr::Int(n) => Ok(Value::Int(*n)),
            Expr::Str(s) => {
                self.alloc(1)?;
                Ok(Value::Str(Rc::from(s.as_str())))
            }
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Null => Ok(Value::Null),
            Expr::This => frame
                .this
                .as_ref()
                .map(|inst| Value::Instance(Rc::clone(inst)))
                .ok_or_else(|| SandboxError::Runtime("'this' outside of method".to_string())),
            Expr::Ident(name) => self.lookup(name, frame),
            Expr::Array(elems) => {
                self.alloc(1 + elems.len())?;
                let mut out = Vec::with_capacity(elems.len());
                for elem in elems {
                    out.push(self.eval(elem, frame)?);
                }
                Ok(Value::List(Rc::new(RefCell::new(out))))
            }
            Expr::Object(pairs) => {
                self.alloc(1 + pairs.len())?;
                let mut out = BTreeMap::new();
                for (key, value) in pairs {
                    let value = self.eval(value, frame)?;
                    out.insert(key.clone(), value);
                }
                Ok(Value::Record(Rc::new(RefCell::new(out))))
            }
            Expr::Member { object, field } => {
                let object = self.eval(object, frame)?;
                self.read_member(&object, field)
            }
            Expr::Index { object, index } => {
                let object = self.eval(object, frame)?;
                let index = self.eval(index, frame)?;
                self.read_index(&object, &index)
            }
            Expr::Call { callee, args } => self.eval_call(callee, args, frame),
            Expr::SuperCall(args) => self.eval_super(args, frame),
            Expr::New { class, args } => {
                let args = self.eval_args(args, frame)?;
                let instance = self.instantiate(class, &args)?;
                Ok(Value::Instance(instance))
            }
            Expr::Unary { op, expr } => {
                let value = self.eval(expr, frame)?;
                match op {
                    UnaryOp::Neg => match value {
                        Value::Int(n) => n
                            .checked_neg()
                            .map(Value::Int)
                            .ok_or_else(|| SandboxError::Runtime("integer overflow".to_string())),
                        other => Err(SandboxError::Runtime(format!(
                            "cannot negate {}",
                            other.type_name()
                        ))),
                    },
                    UnaryOp::Not => Ok(Value::Bool(!is_truthy(&value))),
                }
            }
            Expr::Binary { op, lhs, rhs } => self.eval_binary(*op, lhs, rhs, frame),
            Expr::Assign { target, op, value } => self.eval_assign(target, *op, value, frame),
        }
    }

    fn eval_args(&mut self, args: &[Expr], frame: &mut Frame) -> SandboxResult<Vec<Value>> {
        args.iter().map(|arg| self.eval(arg, frame)).collect()
    }

    fn lookup(&self, name: &str, frame: &Frame) -> SandboxResult<Value> {
        for scope in frame.scopes.iter().rev() {
            if let Some(value) = scope.get(name) {
                return Ok(value.clone());
            }
        }
        if let Some(value) = self.globals.get(name) {
            return Ok(value.clone());
        }
        Err(SandboxError::Runtime(format!(
            "undefined identifier {name}"
        )))
    }

    fn eval_binary(
        &mut self,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
        frame: &mut Frame,
    ) -> SandboxResult<Value> {
        // Short-circuit forms evaluate the right side conditionally
        if op == BinOp::And {
            let lhs = self.eval(lhs, frame)?;
            if !is_truthy(&lhs) {
                return Ok(Value::Bool(false));
            }
            let rhs = self.eval(rhs, frame)?;
            return Ok(Value::Bool(is_truthy(&rhs)));
        }
        if op == BinOp::Or {
            let lhs = self.eval(lhs, frame)?;
            if is_truthy(&lhs) {
                return Ok(Value::Bool(true));
            }
            let rhs = self.eval(rhs, frame)?;
            return Ok(Value::Bool(is_truthy(&rhs)));
        }

        let lhs = self.eval(lhs, frame)?;
        let rhs = self.eval(rhs, frame)?;
        self.apply_binary(op, &lhs, &rhs)
    }

    fn apply_binary(&mut self, op: BinOp, lhs: &Value, rhs: &Value) -> SandboxResult<Value> {
        let arith = |a: i64, b: i64, op: BinOp| -> SandboxResult<i64> {
            let result = match op {
                BinOp::Add => a.checked_add(b),
                BinOp::Sub => a.checked_sub(b),
                BinOp::Mul => a.checked_mul(b),
                BinOp::Div => {
                    if b == 0 {
                        return Err(SandboxError::Runtime("division by zero".to_string()));
                    }
                    a.checked_div(b)
                }
                BinOp::Rem => {
                    if b == 0 {
                        return Err(SandboxError::Runtime("division by zero".to_string()));
                    }
                    a.checked_rem(b)
                }
                _ => unreachable!("non-arithmetic op"),
            };
            result.ok_or_else(|| SandboxError::Runtime("integer overflow".to_string()))
        };

        match op {
            BinOp::Eq => Ok(Value::Bool(values_equal(lhs, rhs))),
            BinOp::NotEq => Ok(Value::Bool(!values_equal(lhs, rhs))),
            BinOp::Add => match (lhs, rhs) {
                (Value::Int(a), Value::Int(b)) => Ok(Value::Int(arith(*a, *b, BinOp::Add)?)),
                (Value::Str(_), _) | (_, Value::Str(_)) => {
                    self.alloc(1)?;
                    let joined = format!("{}{}", display_value(lhs), display_value(rhs));
                    Ok(Value::Str(Rc::from(joined.as_str())))
                }
                _ => Err(SandboxError::Runtime(format!(
                    "cannot add {} and {}",
                    lhs.type_name(),
                    rhs.type_name()
                ))),
            },
            BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Rem => match (lhs, rhs) {
                (Value::Int(a), Value::Int(b)) => Ok(Value::Int(arith(*a, *b, op)?)),
                _ => Err(SandboxError::Runtime(format!(
                    "arithmetic on {} and {}",
                    lhs.type_name(),
                    rhs.type_name()
                ))),
            },
            BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => {
                let ordering = match (lhs, rhs) {
                    (Value::Int(a), Value::Int(b)) => a.cmp(b),
                    (Value::Str(a), Value::Str(b)) => a.cmp(b),
                    _ => {
                        return Err(SandboxError::Runtime(format!(
                            "cannot compare {} and {}",
                            lhs.type_name(),
                            rhs.type_name()
                        )))
                    }
                };
                let result = match op {
                    BinOp::Lt => ordering.is_lt(),
                    BinOp::Gt => ordering.is_gt(),
                    BinOp::Le => ordering.is_le(),
                    BinOp::Ge => ordering.is_ge(),
                    _ => unreachable!(),
                };
                Ok(Value::Bool(result))
            }
            BinOp::And | BinOp::Or => unreachable!("short-circuit handled above"),
        }
    }

    fn eval_call(
        &mut self,
        callee: &Expr,
        args: &[Expr],
        frame: &mut Frame,
    ) -> SandboxResult<Value> {
        match callee {
            Expr::Member { object, field } => {
                let object = self.eval(object, frame)?;
                let args = self.eval_args(args, frame)?;
                match &object {
                    Value::Instance(instance) => {
                        self.call_method_by_name(instance, field, &args)
                    }
                    Value::List(list) => self.call_list_builtin(list, field, &args),
                    other => Err(SandboxError::Runtime(format!(
                        "cannot call method {field} on {}",
                        other.type_name()
                    ))),
                }
            }
            Expr::Ident(name) => Err(SandboxError::Runtime(format!(
                "unknown function {name}"
            ))),
            _ => Err(SandboxError::Runtime("expression is not callable".to_string())),
        }
    }

    fn call_list_builtin(
        &mut self,
        list: &Rc<RefCell<Vec<Value>>>,
        method: &str,
        args: &[Value],
    ) -> SandboxResult<Value> {
        match method {
            "push" => {
                self.alloc(args.len())?;
                list.borrow_mut().extend(args.iter().cloned());
                Ok(Value::Int(list.borrow().len() as i64))
            }
            "pop" => Ok(list.borrow_mut().pop().unwrap_or(Value::Null)),
            other => Err(SandboxError::UnknownMethod(other.to_string())),
        }
    }

    fn eval_super(&mut self, args: &[Expr], frame: &mut Frame) -> SandboxResult<Value> {
        let this = frame
            .this
            .as_ref()
            .cloned()
            .ok_or_else(|| SandboxError::Runtime("'super' outside of method".to_string()))?;
        let class = frame
            .class
            .clone()
            .ok_or_else(|| SandboxError::Runtime("'super' outside of method".to_string()))?;
        let parent = self
            .classes
            .get(&class)
            .and_then(|def| def.parent.clone())
            .ok_or_else(|| SandboxError::Runtime(format!("class {class} has no parent")))?;

        let args = self.eval_args(args, frame)?;
        if let Some((defining, ctor)) = self.find_method(&parent, "constructor") {
            self.call_decl(&ctor, this, defining, &args)?;
        }
        Ok(Value::Null)
    }

    // =========================================================================
    // Member and index access
    // =========================================================================

    fn read_member(&mut self, object: &Value, field: &str) -> SandboxResult<Value> {
        match object {
            Value::Instance(instance) => Ok(instance
                .borrow()
                .fields
                .get(field)
                .cloned()
                .unwrap_or(Value::Null)),
            Value::Record(map) => Ok(map.borrow().get(field).cloned().unwrap_or(Value::Null)),
            Value::List(list) if field == "length" => {
                Ok(Value::Int(list.borrow().len() as i64))
            }
            Value::Str(s) if field == "length" => Ok(Value::Int(s.len() as i64)),
            other => Err(SandboxError::Runtime(format!(
                "cannot read {field} of {}",
                other.type_name()
            ))),
        }
    }

    fn read_index(&mut self, object: &Value, index: &Value) -> SandboxResult<Value> {
        match (object, index) {
            (Value::List(list), Value::Int(i)) => {
                let list = list.borrow();
                let i = usize::try_from(*i).ok();
                Ok(i.and_then(|i| list.get(i).cloned()).unwrap_or(Value::Null))
            }
            (Value::Record(map), Value::Str(key)) => {
                Ok(map.borrow().get(&**key).cloned().unwrap_or(Value::Null))
            }
            (Value::Instance(instance), Value::Str(key)) => Ok(instance
                .borrow()
                .fields
                .get(&**key)
                .cloned()
                .unwrap_or(Value::Null)),
            (object, index) => Err(SandboxError::Runtime(format!(
                "cannot index {} with {}",
                object.type_name(),
                index.type_name()
            ))),
        }
    }

    // =========================================================================
    // Assignment
    // =========================================================================

    fn eval_assign(
        &mut self,
        target: &Expr,
        op: AssignOp,
        value: &Expr,
        frame: &mut Frame,
    ) -> SandboxResult<Value> {
        let rhs = self.eval(value, frame)?;

        match target {
            Expr::Ident(name) => {
                let new = match op {
                    AssignOp::Set => rhs,
                    _ => {
                        let current = self.lookup(name, frame)?;
                        self.apply_compound(op, &current, &rhs)?
                    }
                };
                self.write_ident(name, new.clone(), frame);
                Ok(new)
            }
            Expr::Member { object, field } => {
                let object = self.eval(object, frame)?;
                let new = match op {
                    AssignOp::Set => rhs,
                    _ => {
                        let current = self.read_member(&object, field)?;
                        self.apply_compound(op, &current, &rhs)?
                    }
                };
                self.write_member(&object, field, new.clone())?;
                Ok(new)
            }
            Expr::Index { object, index } => {
                let object = self.eval(object, frame)?;
                let index = self.eval(index, frame)?;
                let new = match op {
                    AssignOp::Set => rhs,
                    _ => {
                        let current = self.read_index(&object, &index)?;
                        self.apply_compound(op, &current, &rhs)?
                    }
                };
                self.write_index(&object, &index, new.clone())?;
                Ok(new)
            }
            _ => Err(SandboxError::Runtime("invalid assignment target".to_string())),
        }
    }

    fn apply_compound(&mut self, op: AssignOp, current: &Value, rhs: &Value) -> SandboxResult<Value> {
        match op {
            AssignOp::Add => self.apply_binary(BinOp::Add, current, rhs),
            AssignOp::Sub => self.apply_binary(BinOp::Sub, current, rhs),
            AssignOp::Set => Ok(rhs.clone()),
        }
    }

    /// Assignment resolution: innermost declared binding wins; an undeclared
    /// name becomes a global (this is how `exports = ...` lands)
    fn write_ident(&mut self, name: &str, value: Value, frame: &mut Frame) {
        for scope in frame.scopes.iter_mut().rev() {
            if let Some(slot) = scope.get_mut(name) {
                *slot = value;
                return;
            }
        }
        self.globals.insert(name.to_string(), value);
    }

    fn write_member(&mut self, object: &Value, field: &str, value: Value) -> SandboxResult<()> {
        self.alloc(1)?;
        match object {
            Value::Instance(instance) => {
                instance
                    .borrow_mut()
                    .fields
                    .insert(field.to_string(), value);
                Ok(())
            }
            Value::Record(map) => {
                map.borrow_mut().insert(field.to_string(), value);
                Ok(())
            }
            other => Err(SandboxError::Runtime(format!(
                "cannot write {field} of {}",
                other.type_name()
            ))),
        }
    }

    fn write_index(&mut self, object: &Value, index: &Value, value: Value) -> SandboxResult<()> {
        self.alloc(1)?;
        match (object, index) {
            (Value::List(list), Value::Int(i)) => {
                let mut list = list.borrow_mut();
                let i = usize::try_from(*i)
                    .map_err(|_| SandboxError::Runtime("negative index".to_string()))?;
                if i >= list.len() {
                    return Err(SandboxError::Runtime(format!(
                        "index {i} out of bounds (len {})",
                        list.len()
                    )));
                }
                list[i] = value;
                Ok(())
            }
            (Value::Record(map), Value::Str(key)) => {
                map.borrow_mut().insert(key.to_string(), value);
                Ok(())
            }
            (object, index) => Err(SandboxError::Runtime(format!(
                "cannot index {} with {}",
                object.type_name(),
                index.type_name()
            ))),
        }
    }
}

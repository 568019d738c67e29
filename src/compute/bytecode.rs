use super::lexer::{tokenize, Spanned, Token};
use super::ledger::CompileError;
use smallvec::SmallVec;

/// Which series a reference reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeriesRef {
    /// `val`: the series being broadcast over.
    General,
    /// `valN`, stored 0-based (`val1` is `Specific(0)`).
    Specific(usize),
    /// `this`: the output under construction.
    This,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOp {
    Begin,
    End,
    Current,
    Constant(i64),
    Add,
    Sub,
}

/// A tiny postfix program that resolves one index bound.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IndexCode {
    pub ops: SmallVec<[IndexOp; 4]>,
}

impl IndexCode {
    pub fn current() -> Self {
        Self { ops: SmallVec::from_slice(&[IndexOp::Current]) }
    }

    pub fn begin() -> Self {
        Self { ops: SmallVec::from_slice(&[IndexOp::Begin]) }
    }

    pub fn end() -> Self {
        Self { ops: SmallVec::from_slice(&[IndexOp::End]) }
    }

    pub fn uses_current(&self) -> bool {
        self.ops.contains(&IndexOp::Current)
    }
}

/// A single position or an inclusive range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexSpec {
    Point(IndexCode),
    Range(IndexCode, IndexCode),
}

impl IndexSpec {
    pub fn uses_current(&self) -> bool {
        match self {
            IndexSpec::Point(c) => c.uses_current(),
            IndexSpec::Range(a, b) => a.uses_current() || b.uses_current(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func1 {
    Sum,
    Average,
    Count,
    StdDev,
    Variance,
    Median,
    Min,
    Max,
    Compound,
    Cagr,
    Product,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func2 {
    SumProduct,
    SumIf,
    AverageIf,
    MedianIf,
}

impl Func1 {
    pub fn name(self) -> &'static str {
        match self {
            Func1::Sum => "sum",
            Func1::Average => "average",
            Func1::Count => "count",
            Func1::StdDev => "stddev",
            Func1::Variance => "variance",
            Func1::Median => "median",
            Func1::Min => "min",
            Func1::Max => "max",
            Func1::Compound => "compound",
            Func1::Cagr => "cagr",
            Func1::Product => "product",
        }
    }
}

impl Func2 {
    pub fn name(self) -> &'static str {
        match self {
            Func2::SumProduct => "sumproduct",
            Func2::SumIf => "sumif",
            Func2::AverageIf => "averageif",
            Func2::MedianIf => "medianif",
        }
    }
}

enum Function {
    Unary(Func1),
    Binary(Func2),
}

fn lookup_function(name: &str) -> Option<Function> {
    use Function::*;
    Some(match name {
        "sum" => Unary(Func1::Sum),
        "average" | "mean" => Unary(Func1::Average),
        "count" => Unary(Func1::Count),
        "stddev" => Unary(Func1::StdDev),
        "variance" => Unary(Func1::Variance),
        "median" => Unary(Func1::Median),
        "min" => Unary(Func1::Min),
        "max" => Unary(Func1::Max),
        "compound" => Unary(Func1::Compound),
        "cagr" => Unary(Func1::Cagr),
        "product" => Unary(Func1::Product),
        "sumproduct" => Binary(Func2::SumProduct),
        "sumif" => Binary(Func2::SumIf),
        "averageif" => Binary(Func2::AverageIf),
        "medianif" => Binary(Func2::MedianIf),
        _ => return None,
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpCode {
    PushNumber(f64),
    PushBool(bool),
    /// Index into `Expression::strings`.
    PushText(u32),
    /// The current position as a number.
    LoadPosition,
    /// Index into `Expression::indices`; pushes a number.
    Load { series: SeriesRef, index: u32 },
    /// Index into `Expression::indices`; pushes a slice.
    LoadSlice { series: SeriesRef, index: u32 },
    /// Index into `Expression::indices`; pushes a string.
    LoadCategory { index: u32 },
    Neg,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    NumEq,
    NumNe,
    TextEq,
    TextNe,
    And,
    Or,
    Not,
    ToBool,
    ToNumber,
    Call1(Func1),
    Call2(Func2),
    /// Pops a boolean; when false jumps to `else_at`.
    Then { else_at: u32 },
    /// End of a then-branch; jumps past the else-branch.
    Else { end_at: u32 },
}

/// A compiled formula: a flat opcode array plus its side tables.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Expression {
    pub source: String,
    pub ops: Vec<OpCode>,
    pub indices: Vec<IndexSpec>,
    pub strings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ty {
    Number,
    Boolean,
    Text,
    Slice,
}

impl Ty {
    fn name(self) -> &'static str {
        match self {
            Ty::Number => "number",
            Ty::Boolean => "boolean",
            Ty::Text => "text",
            Ty::Slice => "series range",
        }
    }
}

/// Compiles formula text into an [`Expression`].
pub fn compile(text: &str) -> Result<Expression, CompileError> {
    let tokens = tokenize(text)?;
    let mut c = Compiler::new(&tokens, text.len());
    let ty = c.expr()?;
    if let Some((tok, span)) = c.peek_spanned() {
        return Err(CompileError::Syntax { pos: span.start, msg: format!("unexpected {:?}", tok) });
    }
    match ty {
        Ty::Number => {}
        Ty::Boolean => c.emit(OpCode::ToNumber),
        other => {
            return Err(CompileError::TypeMismatch(format!("formula yields a {}", other.name())))
        }
    }
    Ok(Expression { source: text.to_string(), ops: c.ops, indices: c.indices, strings: c.strings })
}

struct Compiler<'a> {
    tokens: &'a [Spanned],
    pos: usize,
    src_len: usize,
    ops: Vec<OpCode>,
    indices: Vec<IndexSpec>,
    strings: Vec<String>,
    // Depth of function-call argument lists; changes the default index.
    call_depth: usize,
}

impl<'a> Compiler<'a> {
    fn new(tokens: &'a [Spanned], src_len: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            src_len,
            ops: Vec::new(),
            indices: Vec::new(),
            strings: Vec::new(),
            call_depth: 0,
        }
    }

    // --- Token cursor ---

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_spanned(&self) -> Option<&'a Spanned> {
        self.tokens.get(self.pos)
    }

    fn peek_keyword(&self) -> Option<String> {
        match self.peek() {
            Some(Token::Ident(s)) => Some(s.to_ascii_lowercase()),
            _ => None,
        }
    }

    fn here(&self) -> usize {
        self.tokens.get(self.pos).map(|(_, s)| s.start).unwrap_or(self.src_len)
    }

    fn next(&mut self) -> Option<&'a Token> {
        let t = self.peek();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, tok: &Token) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.peek_keyword().as_deref() == Some(kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: &Token) -> Result<(), CompileError> {
        if self.eat(tok) {
            Ok(())
        } else {
            Err(self.syntax(format!("expected {:?}", tok)))
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<(), CompileError> {
        if self.eat_keyword(kw) {
            Ok(())
        } else {
            Err(self.syntax(format!("expected '{}'", kw)))
        }
    }

    fn syntax(&self, msg: String) -> CompileError {
        CompileError::Syntax { pos: self.here(), msg }
    }

    fn emit(&mut self, op: OpCode) {
        self.ops.push(op);
    }

    // --- Type coercions ---

    fn coerce(&mut self, have: Ty, want: Ty, ctx: &str) -> Result<(), CompileError> {
        match (have, want) {
            (a, b) if a == b => Ok(()),
            (Ty::Number, Ty::Boolean) => {
                self.emit(OpCode::ToBool);
                Ok(())
            }
            (Ty::Boolean, Ty::Number) => {
                self.emit(OpCode::ToNumber);
                Ok(())
            }
            _ => Err(CompileError::TypeMismatch(format!(
                "{} expects a {}, found a {}",
                ctx,
                want.name(),
                have.name()
            ))),
        }
    }

    // --- Grammar ---

    fn expr(&mut self) -> Result<Ty, CompileError> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<Ty, CompileError> {
        let mut ty = self.and_expr()?;
        while self.eat(&Token::OrOr) || self.eat_keyword("or") {
            self.coerce(ty, Ty::Boolean, "'or'")?;
            let rhs = self.and_expr()?;
            self.coerce(rhs, Ty::Boolean, "'or'")?;
            self.emit(OpCode::Or);
            ty = Ty::Boolean;
        }
        Ok(ty)
    }

    fn and_expr(&mut self) -> Result<Ty, CompileError> {
        let mut ty = self.not_expr()?;
        while self.eat(&Token::AndAnd) || self.eat_keyword("and") {
            self.coerce(ty, Ty::Boolean, "'and'")?;
            let rhs = self.not_expr()?;
            self.coerce(rhs, Ty::Boolean, "'and'")?;
            self.emit(OpCode::And);
            ty = Ty::Boolean;
        }
        Ok(ty)
    }

    fn not_expr(&mut self) -> Result<Ty, CompileError> {
        if self.eat(&Token::Bang) || self.eat_keyword("not") {
            let ty = self.not_expr()?;
            self.coerce(ty, Ty::Boolean, "'not'")?;
            self.emit(OpCode::Not);
            return Ok(Ty::Boolean);
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Ty, CompileError> {
        let lhs = self.additive()?;
        let op = match self.peek() {
            Some(Token::Lt) => OpCode::Lt,
            Some(Token::Le) => OpCode::Le,
            Some(Token::Gt) => OpCode::Gt,
            Some(Token::Ge) => OpCode::Ge,
            Some(Token::Eq) => OpCode::NumEq,
            Some(Token::Ne) => OpCode::NumNe,
            _ => return Ok(lhs),
        };
        self.pos += 1;

        if lhs == Ty::Text {
            let rhs = self.additive()?;
            if rhs != Ty::Text {
                return Err(CompileError::TypeMismatch("text only compares with text".into()));
            }
            let text_op = match op {
                OpCode::NumEq => OpCode::TextEq,
                OpCode::NumNe => OpCode::TextNe,
                _ => {
                    return Err(CompileError::TypeMismatch(
                        "text supports only equality comparisons".into(),
                    ))
                }
            };
            self.emit(text_op);
            return Ok(Ty::Boolean);
        }

        self.coerce(lhs, Ty::Number, "comparison")?;
        let rhs = self.additive()?;
        self.coerce(rhs, Ty::Number, "comparison")?;
        self.emit(op);
        Ok(Ty::Boolean)
    }

    fn additive(&mut self) -> Result<Ty, CompileError> {
        let mut ty = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => OpCode::Add,
                Some(Token::Minus) => OpCode::Sub,
                _ => return Ok(ty),
            };
            self.pos += 1;
            self.coerce(ty, Ty::Number, "arithmetic")?;
            let rhs = self.multiplicative()?;
            self.coerce(rhs, Ty::Number, "arithmetic")?;
            self.emit(op);
            ty = Ty::Number;
        }
    }

    fn multiplicative(&mut self) -> Result<Ty, CompileError> {
        let mut ty = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => OpCode::Mul,
                Some(Token::Slash) => OpCode::Div,
                Some(Token::Percent) => OpCode::Mod,
                _ => return Ok(ty),
            };
            self.pos += 1;
            self.coerce(ty, Ty::Number, "arithmetic")?;
            let rhs = self.unary()?;
            self.coerce(rhs, Ty::Number, "arithmetic")?;
            self.emit(op);
            ty = Ty::Number;
        }
    }

    fn unary(&mut self) -> Result<Ty, CompileError> {
        if self.eat(&Token::Minus) {
            let ty = self.unary()?;
            self.coerce(ty, Ty::Number, "negation")?;
            self.emit(OpCode::Neg);
            return Ok(Ty::Number);
        }
        if self.eat(&Token::Plus) {
            let ty = self.unary()?;
            self.coerce(ty, Ty::Number, "unary plus")?;
            return Ok(Ty::Number);
        }
        self.power()
    }

    fn power(&mut self) -> Result<Ty, CompileError> {
        let base = self.primary()?;
        if self.eat(&Token::Caret) {
            self.coerce(base, Ty::Number, "'^'")?;
            // Right-associative: the exponent may itself contain '^'.
            let exp = self.unary()?;
            self.coerce(exp, Ty::Number, "'^'")?;
            self.emit(OpCode::Pow);
            return Ok(Ty::Number);
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Ty, CompileError> {
        let at = self.here();
        match self.next() {
            Some(Token::Number(n)) => {
                self.emit(OpCode::PushNumber(*n));
                Ok(Ty::Number)
            }
            Some(Token::Str(s)) => {
                let id = self.intern(s);
                self.emit(OpCode::PushText(id));
                Ok(Ty::Text)
            }
            Some(Token::LParen) => {
                let ty = self.expr()?;
                self.expect(&Token::RParen)?;
                Ok(ty)
            }
            Some(Token::Ident(name)) => self.identifier(name),
            Some(tok) => Err(CompileError::Syntax { pos: at, msg: format!("unexpected {:?}", tok) }),
            None => Err(CompileError::Syntax { pos: at, msg: "unexpected end of formula".into() }),
        }
    }

    fn intern(&mut self, s: &str) -> u32 {
        match self.strings.iter().position(|x| x == s) {
            Some(i) => i as u32,
            None => {
                self.strings.push(s.to_string());
                (self.strings.len() - 1) as u32
            }
        }
    }

    fn identifier(&mut self, raw: &str) -> Result<Ty, CompileError> {
        let name = raw.to_ascii_lowercase();
        match name.as_str() {
            "if" => return self.conditional(),
            "true" => {
                self.emit(OpCode::PushBool(true));
                return Ok(Ty::Boolean);
            }
            "false" => {
                self.emit(OpCode::PushBool(false));
                return Ok(Ty::Boolean);
            }
            "t" => {
                self.emit(OpCode::LoadPosition);
                return Ok(Ty::Number);
            }
            "category" => {
                let spec = self.index_suffix()?.unwrap_or(IndexSpec::Point(IndexCode::current()));
                if matches!(spec, IndexSpec::Range(..)) {
                    return Err(CompileError::BadIndex("category takes a single position".into()));
                }
                let index = self.push_index(spec);
                self.emit(OpCode::LoadCategory { index });
                return Ok(Ty::Text);
            }
            _ => {}
        }

        if let Some(series) = series_ref(&name) {
            return self.series_reference(series);
        }

        if self.peek() == Some(&Token::LParen) {
            return match lookup_function(&name) {
                Some(f) => self.call(f),
                None => Err(CompileError::UnknownFunction(raw.to_string())),
            };
        }

        Err(CompileError::UnknownIdentifier(raw.to_string()))
    }

    fn conditional(&mut self) -> Result<Ty, CompileError> {
        let cond = self.expr()?;
        self.coerce(cond, Ty::Boolean, "'if' condition")?;
        self.expect_keyword("then")?;

        let then_at = self.ops.len();
        self.emit(OpCode::Then { else_at: 0 });
        let then_ty = self.expr()?;
        self.expect_keyword("else")?;

        let mut else_at = self.ops.len();
        self.emit(OpCode::Else { end_at: 0 });
        let else_ty = self.expr()?;

        // Booleans widen to numbers when the branches disagree.
        let result = match (then_ty, else_ty) {
            (a, b) if a == b => a,
            (Ty::Boolean, Ty::Number) => {
                self.insert_op(else_at, OpCode::ToNumber);
                else_at += 1;
                Ty::Number
            }
            (Ty::Number, Ty::Boolean) => {
                self.emit(OpCode::ToNumber);
                Ty::Number
            }
            (a, b) => {
                return Err(CompileError::TypeMismatch(format!(
                    "'if' branches yield a {} and a {}",
                    a.name(),
                    b.name()
                )))
            }
        };
        if result == Ty::Slice {
            return Err(CompileError::TypeMismatch("'if' cannot yield a series range".into()));
        }

        let end = self.ops.len() as u32;
        self.ops[then_at] = OpCode::Then { else_at: else_at as u32 + 1 };
        self.ops[else_at] = OpCode::Else { end_at: end };
        Ok(result)
    }

    /// Inserts an op mid-stream, moving every already resolved jump target
    /// that lies beyond it.
    fn insert_op(&mut self, at: usize, op: OpCode) {
        self.ops.insert(at, op);
        let at = at as u32;
        for code in self.ops.iter_mut() {
            match code {
                OpCode::Then { else_at } if *else_at > at => *else_at += 1,
                OpCode::Else { end_at } if *end_at > at => *end_at += 1,
                _ => {}
            }
        }
    }

    fn series_reference(&mut self, series: SeriesRef) -> Result<Ty, CompileError> {
        let in_call = self.call_depth > 0;
        let spec = match self.index_suffix()? {
            Some(spec) => spec,
            None if in_call => IndexSpec::Range(IndexCode::begin(), IndexCode::end()),
            None => IndexSpec::Point(IndexCode::current()),
        };
        let is_range = matches!(spec, IndexSpec::Range(..));
        let index = self.push_index(spec);
        if in_call || is_range {
            if !in_call {
                return Err(CompileError::TypeMismatch(
                    "a series range is only valid as a function argument".into(),
                ));
            }
            self.emit(OpCode::LoadSlice { series, index });
            Ok(Ty::Slice)
        } else {
            self.emit(OpCode::Load { series, index });
            Ok(Ty::Number)
        }
    }

    fn push_index(&mut self, spec: IndexSpec) -> u32 {
        self.indices.push(spec);
        (self.indices.len() - 1) as u32
    }

    fn call(&mut self, f: Function) -> Result<Ty, CompileError> {
        self.expect(&Token::LParen)?;
        self.call_depth += 1;
        let arity = match f {
            Function::Unary(_) => 1,
            Function::Binary(_) => 2,
        };
        for i in 0..arity {
            if i > 0 {
                self.expect(&Token::Comma)?;
            }
            let ty = self.expr()?;
            if ty != Ty::Slice {
                self.call_depth -= 1;
                return Err(CompileError::TypeMismatch(format!(
                    "function arguments must be series references, found a {}",
                    ty.name()
                )));
            }
        }
        self.call_depth -= 1;
        self.expect(&Token::RParen)?;
        match f {
            Function::Unary(f) => self.emit(OpCode::Call1(f)),
            Function::Binary(f) => self.emit(OpCode::Call2(f)),
        }
        Ok(Ty::Number)
    }

    // --- Index sub-programs ---

    fn index_suffix(&mut self) -> Result<Option<IndexSpec>, CompileError> {
        if !self.eat(&Token::LBracket) {
            return Ok(None);
        }
        let first = self.index_code()?;
        let spec = if self.eat(&Token::Colon) {
            IndexSpec::Range(first, self.index_code()?)
        } else {
            IndexSpec::Point(first)
        };
        self.expect(&Token::RBracket)?;
        Ok(Some(spec))
    }

    fn index_code(&mut self) -> Result<IndexCode, CompileError> {
        let mut code = IndexCode::default();
        self.index_term(&mut code)?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => IndexOp::Add,
                Some(Token::Minus) => IndexOp::Sub,
                _ => return Ok(code),
            };
            self.pos += 1;
            self.index_term(&mut code)?;
            code.ops.push(op);
        }
    }

    fn index_term(&mut self, code: &mut IndexCode) -> Result<(), CompileError> {
        let negative = self.eat(&Token::Minus);
        match self.next() {
            Some(Token::Number(n)) if n.fract() == 0.0 => {
                let v = *n as i64;
                code.ops.push(IndexOp::Constant(if negative { -v } else { v }));
                Ok(())
            }
            Some(Token::Ident(s)) if !negative => match s.to_ascii_lowercase().as_str() {
                "t" => {
                    code.ops.push(IndexOp::Current);
                    Ok(())
                }
                "begin" => {
                    code.ops.push(IndexOp::Begin);
                    Ok(())
                }
                "end" => {
                    code.ops.push(IndexOp::End);
                    Ok(())
                }
                other => Err(CompileError::BadIndex(format!("'{}' is not valid in an index", other))),
            },
            Some(tok) => Err(CompileError::BadIndex(format!("unexpected {:?} in index", tok))),
            None => Err(CompileError::BadIndex("unterminated index".into())),
        }
    }
}

fn series_ref(name: &str) -> Option<SeriesRef> {
    match name {
        "val" => Some(SeriesRef::General),
        "this" => Some(SeriesRef::This),
        _ => {
            let n: usize = name.strip_prefix("val")?.parse().ok()?;
            if n == 0 { None } else { Some(SeriesRef::Specific(n - 1)) }
        }
    }
}

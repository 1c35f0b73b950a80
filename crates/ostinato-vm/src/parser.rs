//! Recursive-descent parser producing the evaluation tree.

use crate::error::CompileError;
use crate::lexer::{tokenize, Spanned, Tok};
use crate::vm::{VarId, VarTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AssignOp {
    Set,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    BitAnd,
    BitOr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnOp {
    Neg,
    Not,
}

/// Built-in functions. Lvalue-taking and lazily-evaluated ones are handled
/// specially by the interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Builtin {
    Abs,
    Min,
    Max,
    Floor,
    Ceil,
    Sqrt,
    Sqr,
    Sign,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Atan2,
    Exp,
    Log,
    Log10,
    Pow,
    Rand,
    Loop,
    While,
    Printf,
    SliderShow,
    SliderChange,
    SliderAutomate,
    FileVar,
    FileMem,
    FileAvail,
    MidiSend,
    MidiRecv,
    MemSet,
    MemCpy,
}

impl Builtin {
    fn lookup(name: &str) -> Option<Builtin> {
        Some(match name {
            "abs" => Builtin::Abs,
            "min" => Builtin::Min,
            "max" => Builtin::Max,
            "floor" => Builtin::Floor,
            "ceil" => Builtin::Ceil,
            "sqrt" => Builtin::Sqrt,
            "sqr" => Builtin::Sqr,
            "sign" => Builtin::Sign,
            "sin" => Builtin::Sin,
            "cos" => Builtin::Cos,
            "tan" => Builtin::Tan,
            "asin" => Builtin::Asin,
            "acos" => Builtin::Acos,
            "atan" => Builtin::Atan,
            "atan2" => Builtin::Atan2,
            "exp" => Builtin::Exp,
            "log" => Builtin::Log,
            "log10" => Builtin::Log10,
            "pow" => Builtin::Pow,
            "rand" => Builtin::Rand,
            "loop" => Builtin::Loop,
            "while" => Builtin::While,
            "printf" => Builtin::Printf,
            "slider_show" => Builtin::SliderShow,
            "sliderchange" => Builtin::SliderChange,
            "slider_automate" => Builtin::SliderAutomate,
            "file_var" => Builtin::FileVar,
            "file_mem" => Builtin::FileMem,
            "file_avail" => Builtin::FileAvail,
            "midisend" => Builtin::MidiSend,
            "midirecv" => Builtin::MidiRecv,
            "memset" => Builtin::MemSet,
            "memcpy" => Builtin::MemCpy,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Node {
    Num(f64),
    Str(usize),
    Var(VarId),
    Index {
        base: Box<Node>,
        index: Box<Node>,
    },
    Assign {
        target: Box<Node>,
        op: AssignOp,
        value: Box<Node>,
    },
    Unary {
        op: UnOp,
        operand: Box<Node>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    Ternary {
        cond: Box<Node>,
        then_branch: Box<Node>,
        else_branch: Option<Box<Node>>,
    },
    Call {
        func: Builtin,
        args: Vec<Node>,
    },
    /// Parenthesized statement list; value is the last statement's.
    Block(Vec<Node>),
}

/// A compiled section body.
#[derive(Debug, Clone, Default)]
pub(crate) struct Program {
    pub stmts: Vec<Node>,
}

pub(crate) struct Parser<'a> {
    toks: Vec<Spanned>,
    pos: usize,
    vars: &'a mut VarTable,
    strings: &'a mut Vec<String>,
}

impl<'a> Parser<'a> {
    pub(crate) fn parse(
        text: &str,
        line_offset: u32,
        vars: &'a mut VarTable,
        strings: &'a mut Vec<String>,
    ) -> Result<Program, CompileError> {
        let toks = tokenize(text, line_offset)?;
        let mut p = Parser {
            toks,
            pos: 0,
            vars,
            strings,
        };
        let stmts = p.statement_list(&Tok::Eof)?;
        p.expect(Tok::Eof)?;
        Ok(Program { stmts })
    }

    fn peek(&self) -> &Tok {
        &self.toks[self.pos].tok
    }

    fn line(&self) -> u32 {
        self.toks[self.pos].line
    }

    fn bump(&mut self) -> Tok {
        let t = self.toks[self.pos].tok.clone();
        if self.pos + 1 < self.toks.len() {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, t: Tok) -> bool {
        if *self.peek() == t {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, t: Tok) -> Result<(), CompileError> {
        if self.eat(t.clone()) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn unexpected(&self) -> CompileError {
        CompileError {
            line: self.line(),
            message: format!("unexpected {}", self.peek().describe()),
        }
    }

    /// Statements separated by `;` until `end` (not consumed). Trailing
    /// semicolons are tolerated.
    fn statement_list(&mut self, end: &Tok) -> Result<Vec<Node>, CompileError> {
        let mut stmts = Vec::new();
        loop {
            while self.eat(Tok::Semi) {}
            if self.peek() == end {
                break;
            }
            stmts.push(self.expr()?);
            if self.peek() == end {
                break;
            }
            self.expect(Tok::Semi)?;
        }
        Ok(stmts)
    }

    fn expr(&mut self) -> Result<Node, CompileError> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Node, CompileError> {
        let lhs = self.ternary()?;
        let op = match self.peek() {
            Tok::Assign => AssignOp::Set,
            Tok::PlusAssign => AssignOp::Add,
            Tok::MinusAssign => AssignOp::Sub,
            Tok::MulAssign => AssignOp::Mul,
            Tok::DivAssign => AssignOp::Div,
            Tok::ModAssign => AssignOp::Mod,
            _ => return Ok(lhs),
        };
        if !matches!(lhs, Node::Var(_) | Node::Index { .. }) {
            return Err(CompileError {
                line: self.line(),
                message: "left side of assignment is not assignable".into(),
            });
        }
        self.bump();
        let value = self.assignment()?;
        Ok(Node::Assign {
            target: Box::new(lhs),
            op,
            value: Box::new(value),
        })
    }

    fn ternary(&mut self) -> Result<Node, CompileError> {
        let cond = self.logic_or()?;
        if !self.eat(Tok::Question) {
            return Ok(cond);
        }
        let then_branch = self.expr()?;
        let else_branch = if self.eat(Tok::Colon) {
            Some(Box::new(self.expr()?))
        } else {
            None
        };
        Ok(Node::Ternary {
            cond: Box::new(cond),
            then_branch: Box::new(then_branch),
            else_branch,
        })
    }

    fn logic_or(&mut self) -> Result<Node, CompileError> {
        let mut lhs = self.logic_and()?;
        while self.eat(Tok::OrOr) {
            let rhs = self.logic_and()?;
            lhs = Node::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn logic_and(&mut self) -> Result<Node, CompileError> {
        let mut lhs = self.bit_or()?;
        while self.eat(Tok::AndAnd) {
            let rhs = self.bit_or()?;
            lhs = Node::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn bit_or(&mut self) -> Result<Node, CompileError> {
        let mut lhs = self.bit_and()?;
        while self.eat(Tok::Pipe) {
            let rhs = self.bit_and()?;
            lhs = Node::Binary {
                op: BinOp::BitOr,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn bit_and(&mut self) -> Result<Node, CompileError> {
        let mut lhs = self.equality()?;
        while self.eat(Tok::Amp) {
            let rhs = self.equality()?;
            lhs = Node::Binary {
                op: BinOp::BitAnd,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn equality(&mut self) -> Result<Node, CompileError> {
        let mut lhs = self.relational()?;
        loop {
            let op = match self.peek() {
                Tok::Eq => BinOp::Eq,
                Tok::Ne => BinOp::Ne,
                _ => return Ok(lhs),
            };
            self.bump();
            let rhs = self.relational()?;
            lhs = Node::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn relational(&mut self) -> Result<Node, CompileError> {
        let mut lhs = self.additive()?;
        loop {
            let op = match self.peek() {
                Tok::Lt => BinOp::Lt,
                Tok::Gt => BinOp::Gt,
                Tok::Le => BinOp::Le,
                Tok::Ge => BinOp::Ge,
                _ => return Ok(lhs),
            };
            self.bump();
            let rhs = self.additive()?;
            lhs = Node::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn additive(&mut self) -> Result<Node, CompileError> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Tok::Plus => BinOp::Add,
                Tok::Minus => BinOp::Sub,
                _ => return Ok(lhs),
            };
            self.bump();
            let rhs = self.multiplicative()?;
            lhs = Node::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn multiplicative(&mut self) -> Result<Node, CompileError> {
        let mut lhs = self.power()?;
        loop {
            let op = match self.peek() {
                Tok::Star => BinOp::Mul,
                Tok::Slash => BinOp::Div,
                Tok::Percent => BinOp::Mod,
                _ => return Ok(lhs),
            };
            self.bump();
            let rhs = self.power()?;
            lhs = Node::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn power(&mut self) -> Result<Node, CompileError> {
        let lhs = self.unary()?;
        if self.eat(Tok::Caret) {
            let rhs = self.power()?;
            Ok(Node::Binary {
                op: BinOp::Pow,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            })
        } else {
            Ok(lhs)
        }
    }

    fn unary(&mut self) -> Result<Node, CompileError> {
        match self.peek() {
            Tok::Minus => {
                self.bump();
                let operand = self.unary()?;
                Ok(Node::Unary {
                    op: UnOp::Neg,
                    operand: Box::new(operand),
                })
            }
            Tok::Bang => {
                self.bump();
                let operand = self.unary()?;
                Ok(Node::Unary {
                    op: UnOp::Not,
                    operand: Box::new(operand),
                })
            }
            Tok::Plus => {
                self.bump();
                self.unary()
            }
            _ => self.postfix(),
        }
    }

    fn postfix(&mut self) -> Result<Node, CompileError> {
        let mut node = self.primary()?;
        while self.eat(Tok::LBracket) {
            let index = if self.eat(Tok::RBracket) {
                Node::Num(0.0)
            } else {
                let idx = self.expr()?;
                self.expect(Tok::RBracket)?;
                idx
            };
            node = Node::Index {
                base: Box::new(node),
                index: Box::new(index),
            };
        }
        Ok(node)
    }

    fn primary(&mut self) -> Result<Node, CompileError> {
        match self.bump() {
            Tok::Num(v) => Ok(Node::Num(v)),
            Tok::Str(s) => {
                self.strings.push(s);
                Ok(Node::Str(self.strings.len() - 1))
            }
            Tok::Ident(name) => {
                if *self.peek() == Tok::LParen {
                    let func = Builtin::lookup(&name).ok_or_else(|| CompileError {
                        line: self.line(),
                        message: format!("unknown function `{}`", name),
                    })?;
                    self.bump();
                    let mut args = Vec::new();
                    if !self.eat(Tok::RParen) {
                        loop {
                            args.push(self.expr()?);
                            if self.eat(Tok::RParen) {
                                break;
                            }
                            self.expect(Tok::Comma)?;
                        }
                    }
                    // `while (cond) ( body )` and `loop (n) ( body )`
                    if matches!(func, Builtin::While | Builtin::Loop)
                        && args.len() == 1
                        && self.eat(Tok::LParen)
                    {
                        let stmts = self.statement_list(&Tok::RParen)?;
                        self.expect(Tok::RParen)?;
                        args.push(Node::Block(stmts));
                    }
                    Ok(Node::Call { func, args })
                } else {
                    Ok(Node::Var(self.vars.intern(&name)))
                }
            }
            Tok::LParen => {
                let stmts = self.statement_list(&Tok::RParen)?;
                self.expect(Tok::RParen)?;
                if stmts.len() == 1 {
                    Ok(stmts.into_iter().next().unwrap())
                } else {
                    Ok(Node::Block(stmts))
                }
            }
            _ => {
                // bump() already advanced; report the token before the cursor
                self.pos = self.pos.saturating_sub(1);
                Err(self.unexpected())
            }
        }
    }
}

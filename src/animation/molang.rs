//! Molang 表达式
//!
//! 支持基岩版动画中常见的子集：
//! - 数值、四则运算、比较、逻辑、`? :`、`??`
//! - `query.*` / `q.*` 读取动画上下文
//! - `math.*` 函数（三角函数使用角度）
//! - `variable.*` / `v.*` / `temp.*` / `t.*` 局部变量，`;` 分隔语句，`return`
//!
//! 名称不区分大小写。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::context::{AnimationContext, ContextProperty, SECONDS_PER_TICK};
use crate::config::get_config;
use crate::{EngineError, Result};

// ============================================================================
// 词法
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Dot,
    Comma,
    Semicolon,
    LParen,
    RParen,
    Plus,
    Minus,
    Star,
    Slash,
    Bang,
    Question,
    Colon,
    QuestionQuestion,
    AndAnd,
    OrOr,
    Assign,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

fn tokenize(source: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).map_or(false, |n| n.is_ascii_digit())) {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            // 允许 1.5f 这样的浮点后缀
            if i < chars.len() && (chars[i] == 'f' || chars[i] == 'F') {
                i += 1;
            }
            let value = text.parse::<f64>().map_err(|_| script_error(source, format!("bad number '{}'", text)))?;
            tokens.push(Token::Number(value));
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let ident: String = chars[start..i].iter().collect();
            tokens.push(Token::Ident(ident.to_ascii_lowercase()));
            continue;
        }

        let next = chars.get(i + 1).copied();
        let (token, width) = match (c, next) {
            ('?', Some('?')) => (Token::QuestionQuestion, 2),
            ('&', Some('&')) => (Token::AndAnd, 2),
            ('|', Some('|')) => (Token::OrOr, 2),
            ('=', Some('=')) => (Token::Eq, 2),
            ('!', Some('=')) => (Token::Ne, 2),
            ('<', Some('=')) => (Token::Le, 2),
            ('>', Some('=')) => (Token::Ge, 2),
            ('.', _) => (Token::Dot, 1),
            (',', _) => (Token::Comma, 1),
            (';', _) => (Token::Semicolon, 1),
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            ('+', _) => (Token::Plus, 1),
            ('-', _) => (Token::Minus, 1),
            ('*', _) => (Token::Star, 1),
            ('/', _) => (Token::Slash, 1),
            ('!', _) => (Token::Bang, 1),
            ('?', _) => (Token::Question, 1),
            (':', _) => (Token::Colon, 1),
            ('=', _) => (Token::Assign, 1),
            ('<', _) => (Token::Lt, 1),
            ('>', _) => (Token::Gt, 1),
            _ => return Err(script_error(source, format!("unexpected character '{}'", c))),
        };
        tokens.push(token);
        i += width;
    }

    Ok(tokens)
}

fn script_error(source: &str, message: impl fmt::Display) -> EngineError {
    EngineError::Script(format!("{} in `{}`", message, source))
}

// ============================================================================
// 语法树
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
    Coalesce,
}

#[derive(Clone, Debug, PartialEq)]
enum Expr {
    Number(f64),
    /// 根名称 + 成员名 + 可选参数
    Access { root: String, name: String, args: Vec<Expr> },
    Negate(Box<Expr>),
    Not(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Conditional { condition: Box<Expr>, then: Box<Expr>, otherwise: Option<Box<Expr>> },
}

#[derive(Clone, Debug, PartialEq)]
enum Statement {
    Expr(Expr),
    Assign { name: String, value: Expr },
    Return(Expr),
}

struct Parser<'s> {
    source: &'s str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'s> Parser<'s> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> Result<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(format!("expected {:?}, found {:?}", token, self.peek())))
        }
    }

    fn error(&self, message: impl fmt::Display) -> EngineError {
        script_error(self.source, message)
    }

    fn program(&mut self) -> Result<Vec<Statement>> {
        let mut statements = Vec::new();
        while self.peek().is_some() {
            if self.eat(&Token::Semicolon) {
                continue;
            }
            statements.push(self.statement()?);
            if self.peek().is_some() {
                self.expect(&Token::Semicolon)?;
            }
        }
        if statements.is_empty() {
            return Err(self.error("empty expression"));
        }
        Ok(statements)
    }

    fn statement(&mut self) -> Result<Statement> {
        if let Some(Token::Ident(word)) = self.peek() {
            if word == "return" {
                self.pos += 1;
                return Ok(Statement::Return(self.expression()?));
            }
            // v.name = expr
            if is_variable_root(word)
                && self.peek_at(1) == Some(&Token::Dot)
                && matches!(self.peek_at(2), Some(Token::Ident(_)))
                && self.peek_at(3) == Some(&Token::Assign)
            {
                let name = match self.peek_at(2) {
                    Some(Token::Ident(name)) => name.clone(),
                    _ => unreachable!(),
                };
                self.pos += 4;
                return Ok(Statement::Assign { name, value: self.expression()? });
            }
        }
        Ok(Statement::Expr(self.expression()?))
    }

    fn expression(&mut self) -> Result<Expr> {
        let condition = self.binary(0)?;
        if self.eat(&Token::Question) {
            let then = self.expression()?;
            let otherwise = if self.eat(&Token::Colon) { Some(Box::new(self.expression()?)) } else { None };
            return Ok(Expr::Conditional { condition: Box::new(condition), then: Box::new(then), otherwise });
        }
        Ok(condition)
    }

    /// 优先级爬升
    fn binary(&mut self, min_precedence: u8) -> Result<Expr> {
        let mut lhs = self.unary()?;
        loop {
            let (op, precedence) = match self.peek() {
                Some(Token::QuestionQuestion) => (BinaryOp::Coalesce, 1),
                Some(Token::OrOr) => (BinaryOp::Or, 2),
                Some(Token::AndAnd) => (BinaryOp::And, 3),
                Some(Token::Eq) => (BinaryOp::Eq, 4),
                Some(Token::Ne) => (BinaryOp::Ne, 4),
                Some(Token::Lt) => (BinaryOp::Lt, 5),
                Some(Token::Le) => (BinaryOp::Le, 5),
                Some(Token::Gt) => (BinaryOp::Gt, 5),
                Some(Token::Ge) => (BinaryOp::Ge, 5),
                Some(Token::Plus) => (BinaryOp::Add, 6),
                Some(Token::Minus) => (BinaryOp::Sub, 6),
                Some(Token::Star) => (BinaryOp::Mul, 7),
                Some(Token::Slash) => (BinaryOp::Div, 7),
                _ => break,
            };
            if precedence < min_precedence {
                break;
            }
            self.pos += 1;
            let rhs = self.binary(precedence + 1)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr> {
        if self.eat(&Token::Minus) {
            return Ok(Expr::Negate(Box::new(self.unary()?)));
        }
        if self.eat(&Token::Bang) {
            return Ok(Expr::Not(Box::new(self.unary()?)));
        }
        if self.eat(&Token::Plus) {
            return self.unary();
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr> {
        match self.next() {
            Some(Token::Number(value)) => Ok(Expr::Number(value)),
            Some(Token::LParen) => {
                let inner = self.expression()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(root)) => {
                if root == "true" {
                    return Ok(Expr::Number(1.0));
                }
                if root == "false" {
                    return Ok(Expr::Number(0.0));
                }
                self.expect(&Token::Dot)?;
                let name = match self.next() {
                    Some(Token::Ident(name)) => name,
                    other => return Err(self.error(format!("expected member name after '{}.', found {:?}", root, other))),
                };
                let mut args = Vec::new();
                if self.eat(&Token::LParen) {
                    if !self.eat(&Token::RParen) {
                        loop {
                            args.push(self.expression()?);
                            if self.eat(&Token::RParen) {
                                break;
                            }
                            self.expect(&Token::Comma)?;
                        }
                    }
                }
                Ok(Expr::Access { root, name, args })
            }
            other => Err(self.error(format!("unexpected token {:?}", other))),
        }
    }
}

fn is_variable_root(root: &str) -> bool {
    matches!(root, "variable" | "v" | "temp" | "t")
}

// ============================================================================
// 求值
// ============================================================================

/// 求值作用域
pub struct MolangScope<'a> {
    pub context: &'a dyn AnimationContext,
    /// 当前动画时间（秒）
    pub anim_time: f32,
}

struct Evaluator<'a, 'b> {
    scope: &'b MolangScope<'a>,
    source: &'b str,
    variables: HashMap<String, f64>,
}

impl<'a, 'b> Evaluator<'a, 'b> {
    fn run(&mut self, statements: &[Statement]) -> Result<f64> {
        let mut last = 0.0;
        for statement in statements {
            match statement {
                Statement::Expr(expr) => last = self.eval(expr)?,
                Statement::Assign { name, value } => {
                    let value = self.eval(value)?;
                    self.variables.insert(name.clone(), value);
                    last = value;
                }
                Statement::Return(expr) => return self.eval(expr),
            }
        }
        Ok(last)
    }

    fn eval(&mut self, expr: &Expr) -> Result<f64> {
        Ok(match expr {
            Expr::Number(value) => *value,
            Expr::Negate(inner) => -self.eval(inner)?,
            Expr::Not(inner) => truth(self.eval(inner)? == 0.0),
            Expr::Conditional { condition, then, otherwise } => {
                if self.eval(condition)? != 0.0 {
                    self.eval(then)?
                } else if let Some(otherwise) = otherwise {
                    self.eval(otherwise)?
                } else {
                    0.0
                }
            }
            Expr::Binary(op, lhs, rhs) => {
                // 短路求值
                match op {
                    BinaryOp::And => return Ok(truth(self.eval(lhs)? != 0.0 && self.eval(rhs)? != 0.0)),
                    BinaryOp::Or => return Ok(truth(self.eval(lhs)? != 0.0 || self.eval(rhs)? != 0.0)),
                    BinaryOp::Coalesce => {
                        return match self.eval(lhs) {
                            Ok(value) => Ok(value),
                            Err(_) => self.eval(rhs),
                        }
                    }
                    _ => {}
                }
                let a = self.eval(lhs)?;
                let b = self.eval(rhs)?;
                match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => {
                        if b == 0.0 {
                            0.0
                        } else {
                            a / b
                        }
                    }
                    BinaryOp::Lt => truth(a < b),
                    BinaryOp::Le => truth(a <= b),
                    BinaryOp::Gt => truth(a > b),
                    BinaryOp::Ge => truth(a >= b),
                    BinaryOp::Eq => truth(a == b),
                    BinaryOp::Ne => truth(a != b),
                    BinaryOp::And | BinaryOp::Or | BinaryOp::Coalesce => unreachable!(),
                }
            }
            Expr::Access { root, name, args } => {
                let args = args.iter().map(|arg| self.eval(arg)).collect::<Result<Vec<_>>>()?;
                match root.as_str() {
                    "query" | "q" => self.query(name, &args)?,
                    "math" => self.math(name, &args)?,
                    r if is_variable_root(r) => self.variables.get(name).copied().unwrap_or(0.0),
                    _ => return Err(script_error(self.source, format!("unknown namespace '{}'", root))),
                }
            }
        })
    }

    fn query(&self, name: &str, args: &[f64]) -> Result<f64> {
        use ContextProperty as P;

        let context = self.scope.context;
        let property = match name {
            "anim_time" => return Ok(self.scope.anim_time as f64),
            "life_time" => {
                let ticks = context.game_tick() as f64 + context.delta_tick() as f64;
                return Ok(ticks * SECONDS_PER_TICK as f64);
            }
            "all_animations_finished" | "any_animation_finished" => return Ok(0.0),
            "position" | "position_delta" => {
                let property = if name == "position" { P::EntityPosition } else { P::EntityPositionDelta };
                let axis = args.first().copied().unwrap_or(0.0) as usize;
                let value = context.property(property).and_then(|v| v.as_vec3()).unwrap_or_default();
                return Ok(match axis {
                    0 => value.x,
                    1 => value.y,
                    2 => value.z,
                    _ => return Err(script_error(self.source, format!("axis {} out of range", axis))),
                });
            }
            "cardinal_facing_2d" => P::EntityHorizontalFacing,
            "ground_speed" => P::EntityGroundSpeed,
            "vertical_speed" => P::EntityVerticalSpeed,
            "has_rider" => P::EntityHasRider,
            "is_riding" => P::EntityIsRiding,
            "is_in_water" => P::EntityIsInWater,
            "is_in_water_or_rain" => P::EntityIsInWaterOrRain,
            "is_in_fire" => P::EntityIsInFire,
            "is_on_ground" => P::EntityIsOnGround,
            "health" => P::LivingEntityHealth,
            "max_health" => P::LivingEntityMaxHealth,
            "hurt_time" => P::LivingEntityHurtTime,
            "is_dead" => P::LivingEntityIsDead,
            "equipment_count" => P::LivingEntityEquipmentCount,
            "head_x_rotation" => P::PlayerHeadXRotation,
            "head_y_rotation" => P::PlayerHeadYRotation,
            "body_x_rotation" => P::PlayerBodyXRotation,
            "body_y_rotation" => P::PlayerBodyYRotation,
            "is_first_person" => P::PlayerIsFirstPerson,
            "is_spectator" => P::PlayerIsSpectator,
            "is_sneaking" => P::PlayerIsSneaking,
            "is_sprinting" => P::PlayerIsSprinting,
            "is_swimming" => P::PlayerIsSwimming,
            "is_eating" => P::PlayerIsEating,
            "is_using_item" => P::PlayerIsUsingItem,
            "is_jumping" => P::PlayerIsJumping,
            "is_sleeping" => P::PlayerIsSleeping,
            "player_level" => P::PlayerLevel,
            "food_level" => P::PlayerFoodLevel,
            "moon_phase" => P::WorldMoonPhase,
            "time_of_day" => P::WorldTimeOfDay,
            "time_stamp" => P::WorldTimeStamp,
            "weather" => P::WorldWeather,
            "fps" => P::GameFps,
            _ => return Err(script_error(self.source, format!("unknown query '{}'", name))),
        };
        // 上下文未提供的属性按 0 处理
        Ok(context.property(property).and_then(|v| v.as_f64()).unwrap_or(0.0))
    }

    fn math(&self, name: &str, args: &[f64]) -> Result<f64> {
        let arg = |index: usize| -> Result<f64> {
            args.get(index)
                .copied()
                .ok_or_else(|| script_error(self.source, format!("math.{} expects at least {} arguments", name, index + 1)))
        };
        Ok(match name {
            "pi" => std::f64::consts::PI,
            "abs" => arg(0)?.abs(),
            "sin" => arg(0)?.to_radians().sin(),
            "cos" => arg(0)?.to_radians().cos(),
            "asin" => arg(0)?.clamp(-1.0, 1.0).asin().to_degrees(),
            "acos" => arg(0)?.clamp(-1.0, 1.0).acos().to_degrees(),
            "atan" => arg(0)?.atan().to_degrees(),
            "atan2" => arg(0)?.atan2(arg(1)?).to_degrees(),
            "ceil" => arg(0)?.ceil(),
            "floor" => arg(0)?.floor(),
            "round" => arg(0)?.round(),
            "trunc" => arg(0)?.trunc(),
            "sqrt" => arg(0)?.max(0.0).sqrt(),
            "exp" => arg(0)?.exp(),
            "ln" => arg(0)?.ln(),
            "pow" => arg(0)?.powf(arg(1)?),
            "mod" => {
                let b = arg(1)?;
                if b == 0.0 {
                    0.0
                } else {
                    arg(0)? % b
                }
            }
            "min" => arg(0)?.min(arg(1)?),
            "max" => arg(0)?.max(arg(1)?),
            "clamp" => {
                let (low, high) = (arg(1)?, arg(2)?);
                arg(0)?.max(low).min(high)
            }
            "lerp" => {
                let (a, b, t) = (arg(0)?, arg(1)?, arg(2)?);
                a + (b - a) * t
            }
            "lerprotate" => {
                let (a, b, t) = (arg(0)?, arg(1)?, arg(2)?);
                let diff = (b - a + 180.0).rem_euclid(360.0) - 180.0;
                a + diff * t
            }
            "hermite_blend" => {
                let t = arg(0)?;
                3.0 * t * t - 2.0 * t * t * t
            }
            "sign" => arg(0)?.signum(),
            _ => return Err(script_error(self.source, format!("unknown function math.{}", name))),
        })
    }
}

fn truth(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

// ============================================================================
// 公共接口
// ============================================================================

/// 已解析的 Molang 程序
#[derive(Clone, PartialEq)]
pub struct MolangExpr {
    source: String,
    statements: Vec<Statement>,
}

impl MolangExpr {
    pub fn parse(source: &str) -> Result<Self> {
        let tokens = tokenize(source)?;
        let mut parser = Parser { source, tokens, pos: 0 };
        let statements = parser.program()?;
        Ok(Self { source: source.to_owned(), statements })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn eval(&self, scope: &MolangScope<'_>) -> Result<f64> {
        let mut evaluator = Evaluator { scope, source: &self.source, variables: HashMap::new() };
        evaluator.run(&self.statements)
    }
}

impl fmt::Debug for MolangExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MolangExpr({:?})", self.source)
    }
}

/// 关键帧分量：常量或脚本
#[derive(Clone, Debug, PartialEq)]
pub enum MolangValue {
    Plain(f32),
    Script(Arc<MolangExpr>),
}

impl MolangValue {
    /// 纯数字直接作为常量，否则解析为脚本
    pub fn parse(source: &str) -> Result<Self> {
        match source.trim().parse::<f32>() {
            Ok(value) => Ok(MolangValue::Plain(value)),
            Err(_) => Ok(MolangValue::Script(Arc::new(MolangExpr::parse(source)?))),
        }
    }

    /// 求值；脚本出错时记录日志并返回配置中的替代值
    pub fn evaluate(&self, scope: &MolangScope<'_>) -> f32 {
        match self {
            MolangValue::Plain(value) => *value,
            MolangValue::Script(expr) => match expr.eval(scope) {
                Ok(value) => value as f32,
                Err(err) => {
                    log::error!("[Molang] 求值失败: {}", err);
                    get_config().script_error_value
                }
            },
        }
    }
}

impl From<f32> for MolangValue {
    fn from(value: f32) -> Self {
        MolangValue::Plain(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::context::{ContextSnapshot, PropertyValue};
    use glam::DVec3;

    fn eval(source: &str, context: &ContextSnapshot) -> f64 {
        let scope = MolangScope { context, anim_time: 0.5 };
        MolangExpr::parse(source).unwrap().eval(&scope).unwrap()
    }

    #[test]
    fn test_arithmetic_precedence() {
        let context = ContextSnapshot::default();
        assert_eq!(eval("1 + 2 * 3", &context), 7.0);
        assert_eq!(eval("(1 + 2) * 3", &context), 9.0);
        assert_eq!(eval("-2 * -3", &context), 6.0);
        assert_eq!(eval("10 - 4 - 3", &context), 3.0);
        assert_eq!(eval("1 < 2 && 3 >= 3", &context), 1.0);
        assert_eq!(eval("0 ? 5 : 6", &context), 6.0);
        assert_eq!(eval("1 ? 5", &context), 5.0);
    }

    #[test]
    fn test_queries_and_math() {
        let context = ContextSnapshot::new(0, 0.0)
            .with(ContextProperty::EntityGroundSpeed, PropertyValue::Float(2.0))
            .with(ContextProperty::EntityPosition, PropertyValue::Vec3(DVec3::new(1.0, 2.0, 3.0)));

        assert_eq!(eval("q.ground_speed * 10", &context), 20.0);
        assert_eq!(eval("Query.Anim_Time", &context), 0.5);
        assert_eq!(eval("query.position(1)", &context), 2.0);
        assert_eq!(eval("query.health", &context), 0.0);
        assert!((eval("math.sin(90)", &context) - 1.0).abs() < 1e-9);
        assert_eq!(eval("math.clamp(5, 0, 2)", &context), 2.0);
    }

    #[test]
    fn test_statements_and_variables() {
        let context = ContextSnapshot::default();
        assert_eq!(eval("v.a = 3; v.b = v.a * 2; return v.a + v.b;", &context), 9.0);
        assert_eq!(eval("t.x = 4; t.x", &context), 4.0);
    }

    #[test]
    fn test_errors() {
        assert!(MolangExpr::parse("1 +").is_err());
        assert!(MolangExpr::parse("").is_err());
        assert!(MolangExpr::parse("1 $ 2").is_err());

        let context = ContextSnapshot::default();
        let scope = MolangScope { context: &context, anim_time: 0.0 };
        let unknown = MolangExpr::parse("query.not_a_thing").unwrap();
        assert!(unknown.eval(&scope).is_err());

        // 出错时回退到替代值
        let value = MolangValue::parse("math.nope(1)").unwrap();
        assert_eq!(value.evaluate(&scope), get_config().script_error_value);
        assert_eq!(MolangValue::parse(" 2.5 ").unwrap(), MolangValue::Plain(2.5));
    }
}

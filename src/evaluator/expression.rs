use crate::heap::ProgramHeap;
use crate::value::Pointer;

/// The syntactic forms the evaluator dispatches on, in dispatch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpressionKind {
    SelfEvaluating,
    Name,
    ConstantDeclaration,
    VariableDeclaration,
    Assignment,
    Conditional,
    FunctionDefinition,
    Sequence,
    Application,
    Return,
    Block,
    BooleanOperation,
}

impl ExpressionKind {
    pub const ALL: [ExpressionKind; 12] = [
        ExpressionKind::SelfEvaluating,
        ExpressionKind::Name,
        ExpressionKind::ConstantDeclaration,
        ExpressionKind::VariableDeclaration,
        ExpressionKind::Assignment,
        ExpressionKind::Conditional,
        ExpressionKind::FunctionDefinition,
        ExpressionKind::Sequence,
        ExpressionKind::Application,
        ExpressionKind::Return,
        ExpressionKind::Block,
        ExpressionKind::BooleanOperation,
    ];

    /// Classifies an expression. Anything that is not a program pair is a
    /// literal; a program pair is matched on its head tag, first match
    /// winning. `None` means no form matched.
    pub fn classify(program: &ProgramHeap, exp: &Pointer) -> Option<ExpressionKind> {
        let Pointer::Prog(address) = exp else {
            return Some(ExpressionKind::SelfEvaluating);
        };
        let tag = program.head(*address).ok()?;
        let tag = tag.as_str()?;
        ExpressionKind::ALL
            .into_iter()
            .skip(1)
            .find(|kind| kind.tags().contains(&tag))
    }

    /// Head tags of the syntax-tree nodes of this kind.
    pub fn tags(self) -> &'static [&'static str] {
        match self {
            ExpressionKind::SelfEvaluating => &[],
            ExpressionKind::Name => &["name"],
            ExpressionKind::ConstantDeclaration => &["constant_declaration"],
            ExpressionKind::VariableDeclaration => &["variable_declaration"],
            ExpressionKind::Assignment => &["assignment"],
            ExpressionKind::Conditional => &["conditional_expression", "conditional_statement"],
            ExpressionKind::FunctionDefinition => &["function_definition"],
            ExpressionKind::Sequence => &["sequence"],
            ExpressionKind::Application => &["application"],
            ExpressionKind::Return => &["return_statement"],
            ExpressionKind::Block => &["block"],
            ExpressionKind::BooleanOperation => &["boolean_operation"],
        }
    }

    /// The name the controller compares against when dispatching.
    pub fn name(self) -> &'static str {
        match self {
            ExpressionKind::SelfEvaluating => "self_evaluating",
            ExpressionKind::Name => "name",
            ExpressionKind::ConstantDeclaration => "constant_declaration",
            ExpressionKind::VariableDeclaration => "variable_declaration",
            ExpressionKind::Assignment => "assignment",
            ExpressionKind::Conditional => "conditional",
            ExpressionKind::FunctionDefinition => "function_definition",
            ExpressionKind::Sequence => "sequence",
            ExpressionKind::Application => "application",
            ExpressionKind::Return => "return_statement",
            ExpressionKind::Block => "block",
            ExpressionKind::BooleanOperation => "boolean_operation",
        }
    }

    /// Controller label handling this kind.
    pub fn handler(self) -> &'static str {
        match self {
            ExpressionKind::SelfEvaluating => "ev_self_eval",
            ExpressionKind::Name => "ev_name",
            ExpressionKind::ConstantDeclaration => "ev_constant_declaration",
            ExpressionKind::VariableDeclaration => "ev_variable_declaration",
            ExpressionKind::Assignment => "ev_assignment",
            ExpressionKind::Conditional => "ev_conditional",
            ExpressionKind::FunctionDefinition => "ev_function_definition",
            ExpressionKind::Sequence => "ev_sequence",
            ExpressionKind::Application => "ev_application",
            ExpressionKind::Return => "ev_return",
            ExpressionKind::Block => "ev_block",
            ExpressionKind::BooleanOperation => "ev_boolean_operation",
        }
    }
}

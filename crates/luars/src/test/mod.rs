// Test module organization
pub mod test_assembler;
pub mod test_codegen;
pub mod test_errors;
pub mod test_execute;
pub mod test_goto;
pub mod test_lexer;
pub mod test_parser;
pub mod test_scope;

pub mod key_value_pair;
pub mod location;
pub mod object;
pub mod reason_phrase;
pub mod track;

mod input_tests;
mod outcome_tests;

mod evaluation;
mod ownership;
mod test_utils;

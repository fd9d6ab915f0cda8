mod aggregates;
mod queries;
mod test_utils;

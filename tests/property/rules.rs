use proptest::prelude::*;

use localci::rules::evaluate;
use localci::variables::Environment;

proptest! {
    #[test]
    fn negated_match_is_the_opposite_of_match(
        value in "[a-z0-9]{0,8}",
        pattern in "\\^?[a-z.]{1,5}",
        defined in any::<bool>(),
    ) {
        let mut env = Environment::new();
        if defined {
            env.insert("VALUE".to_string(), value);
        }

        let matched = evaluate(&format!("$VALUE =~ /{pattern}/"), &env)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        let not_matched = evaluate(&format!("$VALUE !~ /{pattern}/"), &env)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(matched, !not_matched);
    }

    #[test]
    fn equality_and_inequality_disagree(
        left in "[a-z]{0,4}",
        right in "[a-z]{0,4}",
    ) {
        let mut env = Environment::new();
        env.insert("LEFT".to_string(), left);

        let eq = evaluate(&format!("$LEFT == \"{right}\""), &env)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        let ne = evaluate(&format!("$LEFT != \"{right}\""), &env)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(eq, !ne);
    }
}

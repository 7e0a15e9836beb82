pub mod lost_sales;
pub mod reference_mdp;

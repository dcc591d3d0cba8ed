// Pipeline orchestration: the strictly forward sequence of load,
// filter, normalize, preprocess, prune, fit, regress, render, plus the
// K-selection sweep around it.

pub mod run;

//! Whole-program tests: small algorithms exercising arrays, pointers,
//! recursion and arithmetic together, evaluated through the reference
//! interpreter.

use mcc::compile_and_run;

fn run(text: &str) -> i32 {
  compile_and_run("prog.c", text).expect("pipeline error")
}

#[test]
fn euclid_gcd() {
  let src = "
    int gcd(int a, int b) {
      while (b != 0) {
        int t = b;
        b = a % b;
        a = t;
      }
      return a;
    }
    int main(void) { return gcd(1071, 462) * 100 + gcd(17, 5); }";
  assert_eq!(run(src), 21 * 100 + 1);
}

#[test]
fn iterative_power_with_longs() {
  let src = "
    long ipow(long base, int exp) {
      long r = 1;
      while (exp > 0) {
        if (exp % 2 == 1) r = r * base;
        base = base * base;
        exp = exp / 2;
      }
      return r;
    }
    int main(void) { return (int)(ipow(3, 9) % 1000); }";
  // 3^9 = 19683
  assert_eq!(run(src), 683);
}

#[test]
fn sieve_counts_primes() {
  let src = "
    int main(void) {
      int sieve[50];
      for (int i = 0; i < 50; i = i + 1) sieve[i] = 1;
      sieve[0] = 0;
      sieve[1] = 0;
      for (int i = 2; i < 50; i = i + 1) {
        if (!sieve[i]) continue;
        for (int j = i + i; j < 50; j = j + i) sieve[j] = 0;
      }
      int count = 0;
      for (int i = 0; i < 50; i = i + 1) count = count + sieve[i];
      return count;
    }";
  // primes below 50: 2 3 5 7 11 13 17 19 23 29 31 37 41 43 47
  assert_eq!(run(src), 15);
}

#[test]
fn insertion_sort_through_pointers() {
  let src = "
    void sort(int *a, int n) {
      for (int i = 1; i < n; i = i + 1) {
        int key = a[i];
        int j = i - 1;
        while (j >= 0 && a[j] > key) {
          a[j + 1] = a[j];
          j = j - 1;
        }
        a[j + 1] = key;
      }
    }
    int main(void) {
      int a[6] = {31, 4, 15, 9, 26, 2};
      sort(a, 6);
      int checks = 0;
      for (int i = 1; i < 6; i = i + 1) {
        if (a[i - 1] <= a[i]) checks = checks + 1;
      }
      return checks * 10 + a[0];
    }";
  assert_eq!(run(src), 5 * 10 + 2);
}

#[test]
fn string_length_and_reverse() {
  let src = "
    int length(char *s) {
      int n = 0;
      while (s[n] != 0) n = n + 1;
      return n;
    }
    int main(void) {
      char buf[8] = \"stressed\";
      int n = length(\"desserts\");
      char tmp;
      for (int i = 0; i < n / 2; i = i + 1) {
        tmp = buf[i];
        buf[i] = buf[n - 1 - i];
        buf[n - 1 - i] = tmp;
      }
      // buf now reads \"desserts\"
      char *expect = \"desserts\";
      for (int i = 0; i < n; i = i + 1) {
        if (buf[i] != expect[i]) return 1;
      }
      return 0;
    }";
  assert_eq!(run(src), 0);
}

#[test]
fn collatz_steps() {
  let src = "
    int steps(long n) {
      int count = 0;
      while (n != 1) {
        if (n % 2 == 0) n = n / 2;
        else n = 3 * n + 1;
        count = count + 1;
      }
      return count;
    }
    int main(void) { return steps(27); }";
  assert_eq!(run(src), 111);
}

#[test]
fn matrix_multiply() {
  let src = "
    int main(void) {
      int a[2][2] = {{1, 2}, {3, 4}};
      int b[2][2] = {{5, 6}, {7, 8}};
      int c[2][2];
      for (int i = 0; i < 2; i = i + 1)
        for (int j = 0; j < 2; j = j + 1) {
          c[i][j] = 0;
          for (int k = 0; k < 2; k = k + 1)
            c[i][j] += a[i][k] * b[k][j];
        }
      // [[19, 22], [43, 50]]
      return c[0][0] + c[0][1] + c[1][0] + c[1][1];
    }";
  assert_eq!(run(src), 19 + 22 + 43 + 50);
}

#[test]
fn mutual_recursion_parity() {
  let src = "
    int is_odd(int n);
    int is_even(int n) { return n == 0 ? 1 : is_odd(n - 1); }
    int is_odd(int n) { return n == 0 ? 0 : is_even(n - 1); }
    int main(void) { return is_even(10) * 10 + is_odd(7); }";
  assert_eq!(run(src), 11);
}

#[test]
fn global_accumulator_across_calls() {
  let src = "
    static long total = 0;
    void add(int v) { total = total + v; }
    int main(void) {
      for (int i = 1; i <= 100; i = i + 1) add(i);
      return (int)total;
    }";
  assert_eq!(run(src), 5050);
}

#[test]
fn digit_sum_via_switch() {
  let src = "
    int classify(int d) {
      switch (d) {
        case 0: return 0;
        case 1:
        case 2:
        case 3: return 1;
        default: return 2;
      }
    }
    int main(void) {
      int n = 90321;
      int acc = 0;
      while (n > 0) {
        acc = acc + classify(n % 10);
        n = n / 10;
      }
      return acc;
    }";
  // digits 1,2,3,0,9 classify to 1,1,1,0,2
  assert_eq!(run(src), 5);
}

#[test]
fn pointer_swap_helper() {
  let src = "
    void swap(int *a, int *b) {
      int t = *a;
      *a = *b;
      *b = t;
    }
    int main(void) {
      int x = 3;
      int y = 9;
      swap(&x, &y);
      int a[2] = {1, 2};
      swap(&a[0], &a[1]);
      return x * 1000 + y * 100 + a[0] * 10 + a[1];
    }";
  assert_eq!(run(src), 9 * 1000 + 3 * 100 + 2 * 10 + 1);
}

#[test]
fn unsigned_hash_mixes() {
  let src = "
    unsigned mix(unsigned x) {
      x ^= x >> 4;
      x *= 5u;
      x ^= x >> 8;
      return x;
    }
    int main(void) {
      unsigned h = mix(1000u);
      return (int)(h % 1000u);
    }";
  // 1000 ^ 62 = 982; 982 * 5 = 4910; 4910 ^ 19 = 4925
  assert_eq!(run(src), 925);
}
